//! # mgmt-client-domain
//!
//! Domain model for the management client.
//!
//! This crate contains the core domain model with no infrastructure dependencies:
//!
//! - **Primitives** - `ProjectId`, `WorkspaceId`, `ProjectSlug`, `EntryId`
//! - **Patch** - `PatchPath`, `PatchOp`, `PatchSet`, `ConfigDocument`
//! - **Builder** - `PatchBuilder` (ordered ops against a snapshot)
//! - **Resolution** - strategies, candidates and outcomes for canonical ids
//! - **Resources** - `Backend`, `OAuth2Client`, `ProjectSummary`
//!
//! ## Dependency Rules
//!
//! - Depends only on `shared` crate
//! - No infrastructure or adapter dependencies
//! - Pure domain logic with no I/O

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// Re-export shared types for convenience
pub use mgmt_client_shared::shared_crate_version;

// =============================================================================
// DOMAIN MODULES
// =============================================================================

pub mod builder;
pub mod patch;
pub mod primitives;
pub mod resolution;
pub mod resources;

pub use builder::PatchBuilder;
pub use patch::{ConfigDocument, PatchError, PatchOp, PatchOpKind, PatchPath, PatchSet, PathSegment};
pub use primitives::{EntryId, PrimitiveError, ProjectId, ProjectSlug, WorkspaceId};
pub use resolution::{
    EntryCollection, FingerprintEncoding, ResolutionCandidate, ResolutionInput, ResolutionOutcome,
    ResolutionState, ResolutionStrategy, ResolutionWarning, ResolverPolicy, best_candidate,
    rank_candidates,
};
pub use resources::{Backend, OAuth2Client, ProjectSummary};

/// Returns the domain crate version.
#[must_use]
pub const fn domain_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_crate_compiles() {
        let version = domain_crate_version();
        assert!(!version.is_empty());
    }

    #[test]
    fn domain_depends_on_shared() {
        let shared_version = shared_crate_version();
        assert!(!shared_version.is_empty());
    }
}
