//! # mgmt-client-infra
//!
//! Composition root: turns a validated config plus credentials into the REST
//! client and the use cases built on it.
//! This crate depends on `app`, `adapters`, `config`, `ports`, `domain`, and `shared`.

/// Service wiring from config.
pub mod services;

pub use services::{ClientServices, retry_policies};

/// Returns the infra crate version.
#[must_use]
pub const fn infra_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_crate_compiles() {
        assert!(!infra_crate_version().is_empty());
    }
}
