//! # mgmt-client-shared
//!
//! Shared result types, error handling and resilience helpers for the
//! mgmt-client workspace.
//!
//! This crate provides foundational types that are used across all other crates:
//!
//! - Result and error envelope types, including the remote error taxonomy
//! - Request-scoped cancellation and correlation
//! - Retry-with-backoff helpers
//! - Secret redaction
//!
//! ## Design Principles
//!
//! 1. **No workspace dependencies** - This crate only depends on external crates
//! 2. **Cancellation everywhere** - every wait honors the request context
//! 3. **Serde-compatible** - error types support serialization

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

// =============================================================================
// RESULT + ERROR ENVELOPE
// =============================================================================

pub mod concurrency;
pub mod errors;
pub mod redaction;
pub mod result;

// =============================================================================
// RESILIENCE
// =============================================================================

pub mod retry;

pub use concurrency::{CancellationToken, CorrelationId, RequestContext};
pub use errors::{ErrorCategory, ErrorCode, ErrorEnvelope, ErrorKind, ErrorMetadata};
pub use redaction::{REDACTED, SecretString, is_secret_key};
pub use result::Result;
pub use retry::{RetryPolicy, retry_async, retry_async_with_observer};

/// Returns the shared crate version.
#[must_use]
pub const fn shared_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// =============================================================================
// TESTS
// =============================================================================
