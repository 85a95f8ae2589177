//! Request-scoped context: correlation and cooperative cancellation.
//!
//! Every blocking client operation (HTTP call, retry backoff, resolver poll)
//! receives a `RequestContext` and returns promptly once its token is
//! cancelled. Clones share one token, so cancelling any clone cancels the
//! whole request.

use crate::{ErrorCode, ErrorEnvelope, Result};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub use tokio_util::sync::CancellationToken;

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Identifier attached to log events of one reconciliation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    /// Accept a caller-provided identifier (trimmed, non-empty).
    pub fn parse(value: impl AsRef<str>) -> Result<Self> {
        let trimmed = value.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "correlation id must be non-empty",
            ));
        }
        Ok(Self(Arc::from(trimmed)))
    }

    /// Next process-local identifier (`mgmt-<n>`).
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_REQUEST.fetch_add(1, Ordering::Relaxed);
        Self(Arc::from(format!("mgmt-{n}")))
    }

    /// Borrow the identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Correlation id plus cancellation token for one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    correlation_id: CorrelationId,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Context with a fresh token.
    #[must_use]
    pub fn new(correlation_id: CorrelationId) -> Self {
        Self::with_cancellation(correlation_id, CancellationToken::new())
    }

    /// Context with a generated correlation id.
    #[must_use]
    pub fn new_request() -> Self {
        Self::new(CorrelationId::generate())
    }

    /// Context driven by an existing token, e.g. a caller's shutdown signal.
    #[must_use]
    pub const fn with_cancellation(
        correlation_id: CorrelationId,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            correlation_id,
            cancellation,
        }
    }

    /// Identifier for log events.
    #[must_use]
    pub const fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Token shared by every clone of this context.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Whether the request was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Cancel the request and every clone of this context.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Resolves once the request is cancelled.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// `Cancelled` error tagged with `operation` when the request is cancelled.
    pub fn ensure_not_cancelled(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ErrorEnvelope::cancelled("operation cancelled")
                .with_metadata("operation", operation));
        }
        Ok(())
    }
}
