//! Error envelope types and helpers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata attached to errors for diagnostics.
pub type ErrorMetadata = BTreeMap<String, String>;

/// High-level classification of error origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Expected failures (validation, user input, cancellation).
    Expected,
    /// Invariant violations in domain logic.
    Invariant,
    /// Unexpected failures (I/O, remote services).
    Unexpected,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expected => formatter.write_str("expected"),
            Self::Invariant => formatter.write_str("invariant"),
            Self::Unexpected => formatter.write_str("unexpected"),
        }
    }
}

/// Failure taxonomy used for retry eligibility and user-facing reporting.
///
/// Every failed call maps to exactly one category. Retry policies select the
/// categories they are willing to retry; everything else propagates at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The remote service throttled the request (HTTP 429).
    TransientRateLimited,
    /// The remote service failed transiently (5xx, dropped connection).
    TransientServer,
    /// The requested feature is not available on the current plan.
    FeatureUnavailable,
    /// Credentials were rejected (HTTP 401).
    Unauthorized,
    /// Credentials lack permission (HTTP 403).
    Forbidden,
    /// The addressed object does not exist (HTTP 404).
    NotFound,
    /// Identifier resolution was cancelled while polling.
    ResolutionCancelled,
    /// The operation was cancelled by the caller.
    Cancelled,
    /// Local validation failed; the request never left the process.
    LocalValidation,
    /// Anything else.
    Other,
}

impl ErrorCategory {
    /// Returns a stable snake-case label for metadata and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TransientRateLimited => "transient_rate_limited",
            Self::TransientServer => "transient_server",
            Self::FeatureUnavailable => "feature_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::ResolutionCancelled => "resolution_cancelled",
            Self::Cancelled => "cancelled",
            Self::LocalValidation => "local_validation",
            Self::Other => "other",
        }
    }

    /// Returns true for the two transient remote categories.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::TransientRateLimited | Self::TransientServer)
    }

    /// Returns true for caller or resolver cancellation.
    #[must_use]
    pub const fn is_cancellation(self) -> bool {
        matches!(self, Self::Cancelled | Self::ResolutionCancelled)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Stable error code with namespace and identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode {
    namespace: String,
    code: String,
}

impl ErrorCode {
    /// Create a new error code with a namespace and code.
    pub fn new(namespace: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            code: code.into(),
        }
    }

    /// Core cancellation code.
    pub fn cancelled() -> Self {
        Self::new("core", "cancelled")
    }

    /// Invalid input code.
    pub fn invalid_input() -> Self {
        Self::new("core", "invalid_input")
    }

    /// Not found code.
    pub fn not_found() -> Self {
        Self::new("core", "not_found")
    }

    /// Internal failure code.
    pub fn internal() -> Self {
        Self::new("core", "internal")
    }

    /// Returns the namespace portion.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the code identifier.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.namespace, self.code)
    }
}

/// Structured error envelope shared across crates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Error kind describing the origin category.
    pub kind: ErrorKind,
    /// Failure category (drives retry eligibility).
    pub category: ErrorCategory,
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
    /// Additional diagnostic metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: ErrorMetadata,
}

impl ErrorEnvelope {
    /// Create an expected local validation error.
    pub fn expected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::expected_with_category(code, message, ErrorCategory::LocalValidation)
    }

    /// Create an expected error with an explicit category.
    pub fn expected_with_category(
        code: ErrorCode,
        message: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            kind: ErrorKind::Expected,
            category,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an invariant error (never retried).
    pub fn invariant(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Invariant,
            category: ErrorCategory::Other,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create an unexpected error with the provided category.
    pub fn unexpected(code: ErrorCode, message: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            category,
            code,
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::expected_with_category(ErrorCode::cancelled(), message, ErrorCategory::Cancelled)
    }

    /// Returns true if the error represents a cancellation of any kind.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        self.category.is_cancellation()
    }

    /// Attach a single metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Look up a metadata value.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{} {} {}: {}",
            self.kind, self.category, self.code, self.message
        )
    }
}

impl std::error::Error for ErrorEnvelope {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_envelope_constructors() {
        let expected = ErrorEnvelope::expected(ErrorCode::invalid_input(), "invalid");
        assert_eq!(expected.kind, ErrorKind::Expected);
        assert_eq!(expected.category, ErrorCategory::LocalValidation);
        assert_eq!(expected.code, ErrorCode::invalid_input());

        let invariant = ErrorEnvelope::invariant(ErrorCode::internal(), "boom");
        assert_eq!(invariant.kind, ErrorKind::Invariant);
        assert_eq!(invariant.category, ErrorCategory::Other);

        let unexpected = ErrorEnvelope::unexpected(
            ErrorCode::new("remote", "transient_server"),
            "bad gateway",
            ErrorCategory::TransientServer,
        );
        assert_eq!(unexpected.kind, ErrorKind::Unexpected);
        assert!(unexpected.category.is_transient());
    }

    #[test]
    fn cancellation_covers_both_categories() {
        assert!(ErrorEnvelope::cancelled("stopped").is_cancelled());
        let resolution = ErrorEnvelope::expected_with_category(
            ErrorCode::new("resolution", "cancelled"),
            "stopped polling",
            ErrorCategory::ResolutionCancelled,
        );
        assert!(resolution.is_cancelled());
        assert!(!ErrorCategory::TransientServer.is_cancellation());
    }

    #[test]
    fn display_joins_kind_category_and_code() {
        let error = ErrorEnvelope::unexpected(
            ErrorCode::new("remote", "transient_rate_limited"),
            "slow down",
            ErrorCategory::TransientRateLimited,
        )
        .with_metadata("status", "429");

        assert_eq!(
            error.to_string(),
            "unexpected transient_rate_limited remote:transient_rate_limited: slow down"
        );
        assert_eq!(error.metadata_value("status"), Some("429"));
        assert_eq!(error.code.namespace(), "remote");
    }
}
