//! # mgmt-client-ports
//!
//! Port traits for the mgmt-client hexagonal architecture.
//!
//! This crate defines the interfaces between the domain and infrastructure
//! layers. It depends only on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Returns the ports crate version.
#[must_use]
pub const fn ports_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub mod oauth2;
pub mod project;

pub use oauth2::*;
pub use project::*;

// Re-export selected domain types used in port signatures, so adapter crates
// can implement ports without naming `mgmt-client-domain` for them.
pub use mgmt_client_domain::{
    ConfigDocument, OAuth2Client, PatchSet, ProjectId, ProjectSummary, WorkspaceId,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn manifest_names_only_domain_and_shared() {
        let manifest = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let internal: Vec<&str> = manifest
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("mgmt-client-"))
            .filter_map(|line| line.split('.').next())
            .collect();

        assert_eq!(internal, ["mgmt-client-domain", "mgmt-client-shared"]);
    }

    #[test]
    fn ports_are_usable_as_shared_trait_objects() {
        fn accepts(
            _project: Option<Arc<dyn ProjectConfigPort>>,
            _workspace: Option<Arc<dyn WorkspacePort>>,
            _clients: Option<Arc<dyn OAuth2ClientPort>>,
        ) {
        }
        accepts(None, None, None);
        assert!(!ports_crate_version().is_empty());
    }
}
