//! Remote failure classification and error enrichment.
//!
//! A failed call is reduced to an [`ErrorDescriptor`] once, then turned into
//! the `ErrorEnvelope` callers see. The descriptor can be recovered from the
//! envelope for debugging with [`ErrorDescriptor::from_envelope`].

use mgmt_client_domain::Backend;
use mgmt_client_shared::{ErrorCategory, ErrorCode, ErrorEnvelope};
use serde_json::Value;
use std::fmt;

/// Domain error id the backends use for plan-gated features.
pub const FEATURE_NOT_AVAILABLE: &str = "feature_not_available";

/// Response header carrying the request correlation id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const PLAN_HINT: &str =
    "; the connection was closed early, which can mean the current plan does not include this operation";

const RAW_BODY_LIMIT: usize = 4_096;
const EMBEDDED_JSON_CANDIDATES: usize = 16;

const META_BACKEND: &str = "backend";
const META_OPERATION: &str = "operation";
const META_STATUS: &str = "http_status";
const META_ERROR_ID: &str = "error_id";
const META_REASON: &str = "reason";
const META_DETAIL: &str = "detail";
const META_REQUEST_ID: &str = "request_id";
const META_FEATURE: &str = "feature";
const META_RAW_BODY: &str = "raw_body";
const META_PLAN_RELATED: &str = "possibly_plan_related";

/// Transport-level failure shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// The request exceeded its timeout.
    Timeout,
    /// The connection could not be established.
    Connect,
    /// The peer closed the connection mid-exchange.
    Eof,
    /// Anything else.
    Other,
}

/// A failed remote call, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteFailure {
    /// The server answered with a non-success status.
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body (lossy UTF-8).
        body: String,
        /// `x-request-id` response header.
        request_id_header: Option<String>,
    },
    /// No usable response.
    Transport {
        /// Failure shape.
        kind: TransportKind,
        /// Error text.
        message: String,
    },
    /// Only the string form of an error is available.
    Message(String),
}

impl RemoteFailure {
    /// Reduce a `reqwest` error to a transport failure.
    #[must_use]
    pub fn from_reqwest(error: &reqwest::Error) -> Self {
        let message = error_chain_text(error);
        let kind = if error.is_timeout() {
            TransportKind::Timeout
        } else if error.is_connect() {
            TransportKind::Connect
        } else if mentions_eof(&message) {
            TransportKind::Eof
        } else {
            TransportKind::Other
        };
        Self::Transport { kind, message }
    }
}

/// Structured description of a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescriptor {
    /// HTTP status, when known.
    pub status: Option<u16>,
    /// Domain error id from the body.
    pub error_id: Option<String>,
    /// Human-readable reason from the body.
    pub reason: Option<String>,
    /// Best available description of the failure.
    pub message: String,
    /// Request correlation id.
    pub request_id: Option<String>,
    /// Feature name for plan-gated failures.
    pub feature: Option<String>,
    /// Raw response body, truncated.
    pub raw_body: Option<String>,
    /// Failure category.
    pub category: ErrorCategory,
    /// Set when the failure shape is typical of a plan-tier limit.
    pub possibly_plan_related: bool,
}

#[derive(Debug, Default)]
struct BodyFields {
    status: Option<u16>,
    error_id: Option<String>,
    reason: Option<String>,
    message: Option<String>,
    request_id: Option<String>,
    feature: Option<String>,
}

/// Classify a failed call. Total: every input yields a descriptor.
#[must_use]
pub fn classify(failure: &RemoteFailure) -> ErrorDescriptor {
    match failure {
        RemoteFailure::Http {
            status,
            body,
            request_id_header,
        } => {
            let fields = serde_json::from_str::<Value>(body)
                .ok()
                .and_then(|value| body_fields(&value))
                .or_else(|| find_embedded_json(body).and_then(|value| body_fields(&value)))
                .unwrap_or_default();
            let status = Some(*status);
            let category = categorize(status, fields.error_id.as_deref(), None);
            let message = fields
                .message
                .clone()
                .or_else(|| fields.reason.clone())
                .unwrap_or_else(|| fallback_http_message(status, body));
            ErrorDescriptor {
                status,
                request_id: fields.request_id.or_else(|| request_id_header.clone()),
                error_id: fields.error_id,
                reason: fields.reason,
                message,
                feature: fields.feature,
                raw_body: (!body.is_empty()).then(|| truncate(body)),
                category,
                possibly_plan_related: false,
            }
        },
        RemoteFailure::Transport { kind, message } => {
            let category = categorize(None, None, Some(*kind));
            ErrorDescriptor {
                status: None,
                error_id: None,
                reason: None,
                message: message.clone(),
                request_id: None,
                feature: None,
                raw_body: None,
                category,
                possibly_plan_related: *kind == TransportKind::Eof,
            }
        },
        RemoteFailure::Message(text) => {
            let fields = find_embedded_json(text)
                .and_then(|value| body_fields(&value))
                .unwrap_or_default();
            let status = fields.status.or_else(|| status_from_text(text));
            let eof = status.is_none() && mentions_eof(text);
            let transport = eof.then_some(TransportKind::Eof);
            let category = categorize(status, fields.error_id.as_deref(), transport);
            ErrorDescriptor {
                status,
                error_id: fields.error_id,
                reason: fields.reason.clone(),
                message: fields.message.or(fields.reason).unwrap_or_else(|| text.clone()),
                request_id: fields.request_id,
                feature: fields.feature,
                raw_body: None,
                category,
                possibly_plan_related: eof,
            }
        },
    }
}

fn categorize(
    status: Option<u16>,
    error_id: Option<&str>,
    transport: Option<TransportKind>,
) -> ErrorCategory {
    if error_id == Some(FEATURE_NOT_AVAILABLE) {
        return ErrorCategory::FeatureUnavailable;
    }
    match transport {
        Some(TransportKind::Eof | TransportKind::Timeout | TransportKind::Connect) => {
            return ErrorCategory::TransientServer;
        },
        Some(TransportKind::Other) | None => {},
    }
    match status {
        Some(401) => ErrorCategory::Unauthorized,
        Some(403) => ErrorCategory::Forbidden,
        Some(404) => ErrorCategory::NotFound,
        Some(429) => ErrorCategory::TransientRateLimited,
        Some(500..=599) => ErrorCategory::TransientServer,
        _ => ErrorCategory::Other,
    }
}

impl ErrorDescriptor {
    /// Build the caller-facing envelope for a failed `operation` on `backend`.
    #[must_use]
    pub fn into_envelope(self, backend: Backend, operation: &'static str) -> ErrorEnvelope {
        let code = ErrorCode::new("remote", self.category.as_str());
        let message = self.user_message(operation);
        let mut envelope = match self.category {
            ErrorCategory::TransientRateLimited
            | ErrorCategory::TransientServer
            | ErrorCategory::Other => ErrorEnvelope::unexpected(code, message, self.category),
            _ => ErrorEnvelope::expected_with_category(code, message, self.category),
        }
        .with_metadata(META_BACKEND, backend.as_str())
        .with_metadata(META_OPERATION, operation)
        .with_metadata(META_DETAIL, self.message);

        let optional = [
            (META_STATUS, self.status.map(|status| status.to_string())),
            (META_ERROR_ID, self.error_id),
            (META_REASON, self.reason),
            (META_REQUEST_ID, self.request_id),
            (META_FEATURE, self.feature),
            (META_RAW_BODY, self.raw_body),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                envelope = envelope.with_metadata(key, value);
            }
        }
        if self.possibly_plan_related {
            envelope = envelope.with_metadata(META_PLAN_RELATED, "true");
        }
        envelope
    }

    /// Recover the descriptor from an envelope built by [`Self::into_envelope`].
    #[must_use]
    pub fn from_envelope(envelope: &ErrorEnvelope) -> Option<Self> {
        if envelope.code.namespace() != "remote" || envelope.code.code() != envelope.category.as_str()
        {
            return None;
        }
        let owned = |key: &str| envelope.metadata_value(key).map(str::to_owned);
        Some(Self {
            status: envelope
                .metadata_value(META_STATUS)
                .and_then(|raw| raw.parse().ok()),
            error_id: owned(META_ERROR_ID),
            reason: owned(META_REASON),
            message: owned(META_DETAIL).unwrap_or_else(|| envelope.message.clone()),
            request_id: owned(META_REQUEST_ID),
            feature: owned(META_FEATURE),
            raw_body: owned(META_RAW_BODY),
            category: envelope.category,
            possibly_plan_related: envelope.metadata_value(META_PLAN_RELATED) == Some("true"),
        })
    }

    fn user_message(&self, operation: &str) -> String {
        let mut message = match (self.category, self.feature.as_deref()) {
            (ErrorCategory::FeatureUnavailable, Some(feature)) => format!(
                "{operation} failed: feature `{feature}` is not available: {}",
                self.reason.as_deref().unwrap_or(&self.message)
            ),
            _ => format!("{operation} failed: {}", self.message),
        };
        if let Some(status) = self.status {
            message.push_str(&format!(" (status {status})"));
        }
        if self.possibly_plan_related {
            message.push_str(PLAN_HINT);
        }
        if let Some(request_id) = self.request_id.as_deref() {
            message.push_str(&format!(" [request id: {request_id}]"));
        }
        message
    }
}

impl fmt::Display for ErrorDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}", self.category, self.message)?;
        if let Some(request_id) = self.request_id.as_deref() {
            write!(formatter, " [request id: {request_id}]")?;
        }
        Ok(())
    }
}

/// Extract error fields from `{error: {...}}` or the OAuth2 `{error, error_description}` shape.
fn body_fields(value: &Value) -> Option<BodyFields> {
    let error = value.get("error")?;
    let text = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
            .map(str::to_owned)
    };

    if let Some(id) = error.as_str() {
        return Some(BodyFields {
            error_id: Some(id.to_owned()),
            reason: text(value, "error_description"),
            message: text(value, "error_hint").or_else(|| text(value, "error_description")),
            ..BodyFields::default()
        });
    }
    if !error.is_object() {
        return None;
    }

    Some(BodyFields {
        status: error
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok()),
        error_id: text(error, "id"),
        reason: text(error, "reason"),
        message: text(error, "message"),
        request_id: text(error, "request"),
        feature: error
            .get("details")
            .and_then(|details| text(details, "feature")),
    })
}

/// First JSON object embedded in `text` that carries an `error` member.
fn find_embedded_json(text: &str) -> Option<Value> {
    text.match_indices('{')
        .take(EMBEDDED_JSON_CANDIDATES)
        .find_map(|(start, _)| {
            let slice = text.get(start..)?;
            let mut stream = serde_json::Deserializer::from_str(slice).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value)) if value.get("error").is_some() => Some(value),
                _ => None,
            }
        })
}

/// HTTP status found in free text.
///
/// A status after an `HTTP`, `status` or `code` marker wins; otherwise the
/// first standalone three-digit token in `100..=599` is used.
fn status_from_text(text: &str) -> Option<u16> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .collect();
    let parse = |token: &str| {
        (token.len() == 3)
            .then(|| token.parse::<u16>().ok())
            .flatten()
            .filter(|status| (100..=599).contains(status))
    };

    let marked = tokens.windows(2).find_map(|pair| match pair {
        [marker, value]
            if matches!(
                marker.to_ascii_lowercase().as_str(),
                "http" | "status" | "code"
            ) =>
        {
            parse(value)
        },
        _ => None,
    });
    marked.or_else(|| tokens.iter().find_map(|token| parse(token)))
}

fn mentions_eof(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    text.contains("EOF")
        || lower.contains("unexpected end of file")
        || lower.contains("connection closed before message completed")
        || lower.contains("incomplete message")
}

fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

fn fallback_http_message(status: Option<u16>, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status.map_or_else(
            || "request failed".to_owned(),
            |status| format!("HTTP {status}"),
        );
    }
    truncate(trimmed)
}

fn truncate(text: &str) -> String {
    if text.len() <= RAW_BODY_LIMIT {
        return text.to_owned();
    }
    let end = (0..=RAW_BODY_LIMIT)
        .rev()
        .find(|&end| text.is_char_boundary(end))
        .unwrap_or_default();
    format!("{}…", text.get(..end).unwrap_or_default())
}
