//! # mgmt-client-app
//!
//! Application layer: patch application, canonical-id resolution and typed
//! stores over the remote ports.
//! This crate depends on `ports`, `domain`, and `shared`.

pub mod apply_patch;
pub mod named_entries;
pub mod oauth2_clients;
pub mod resolve_canonical_id;
pub mod snapshot_cache;

pub use apply_patch::{AppliedPatch, ProjectConfigApplier, RetryPolicies};
pub use named_entries::{CreatedEntry, NamedEntryStore, StoredEntry, TrackedEntry};
pub use oauth2_clients::OAuth2ClientStore;
pub use resolve_canonical_id::{ResolveCanonicalIdInput, resolve_canonical_id};
pub use snapshot_cache::SnapshotCache;

/// Returns the app crate version.
#[must_use]
pub const fn app_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
