//! # mgmt-client-adapters
//!
//! Adapter implementations for the ports: the dual-backend REST client, its
//! routing table and its error classifier.
//! This crate depends on `ports`, `shared`, `domain` and `config`.

pub mod remote;

pub use remote::{DualBackendClient, ErrorDescriptor, Operation, RoutingTable, classify};

/// Returns the adapters crate version.
#[must_use]
pub const fn adapters_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
