//! Domain primitives with validated constructors.

use mgmt_client_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validation failures for domain primitives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `ProjectId` is empty after trimming.
    InvalidProjectId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `WorkspaceId` is empty after trimming.
    InvalidWorkspaceId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `ProjectSlug` is empty or contains characters outside `[a-z0-9-]`.
    InvalidProjectSlug {
        /// Trimmed slug that failed validation.
        input: String,
    },
    /// `EntryId` is empty after trimming.
    InvalidEntryId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `EntryId` contains a path separator.
    EntryIdContainsSlash {
        /// Trimmed identifier that failed validation.
        input: String,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidProjectId { .. } => ErrorCode::new("domain", "invalid_project_id"),
            Self::InvalidWorkspaceId { .. } => ErrorCode::new("domain", "invalid_workspace_id"),
            Self::InvalidProjectSlug { .. } => ErrorCode::new("domain", "invalid_project_slug"),
            Self::InvalidEntryId { .. } | Self::EntryIdContainsSlash { .. } => {
                ErrorCode::new("domain", "invalid_entry_id")
            },
        }
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidProjectId { .. } => formatter.write_str("ProjectId must be non-empty"),
            Self::InvalidWorkspaceId { .. } => formatter.write_str("WorkspaceId must be non-empty"),
            Self::InvalidProjectSlug { .. } => {
                formatter.write_str("ProjectSlug must match /^[a-z0-9][a-z0-9-]*$/")
            },
            Self::InvalidEntryId { .. } => formatter.write_str("EntryId must be non-empty"),
            Self::EntryIdContainsSlash { .. } => {
                formatter.write_str("EntryId must not contain '/'")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            PrimitiveError::InvalidProjectId { input_length }
            | PrimitiveError::InvalidWorkspaceId { input_length }
            | PrimitiveError::InvalidEntryId { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::InvalidProjectSlug { input }
            | PrimitiveError::EntryIdContainsSlash { input } => envelope.with_metadata("input", input),
        }
    }
}

macro_rules! non_empty_id {
    ($(#[$meta:meta])* $name:ident, $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Box<str>);

        impl $name {
            /// Parse the identifier from user input (trimmed, non-empty).
            pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
                let raw = input.as_ref();
                let Some(trimmed) = trimmed_non_empty(raw) else {
                    return Err(PrimitiveError::$variant {
                        input_length: raw.len(),
                    });
                };

                Ok(Self(trimmed.to_owned().into_boxed_str()))
            }

            /// Access the underlying string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the underlying string.
            #[must_use]
            pub fn into_inner(self) -> Box<str> {
                self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.as_str()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str(self.as_str())
            }
        }
    };
}

non_empty_id!(
    /// Identifier of a project on the console backend.
    ProjectId,
    InvalidProjectId
);

non_empty_id!(
    /// Identifier of a workspace grouping projects on the console backend.
    WorkspaceId,
    InvalidWorkspaceId
);

/// DNS-safe project slug used to derive the tenant host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectSlug(Box<str>);

impl ProjectSlug {
    /// Parse a slug made of lowercase ASCII letters, digits and dashes.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let trimmed = input.as_ref().trim();
        if !is_valid_slug(trimmed) {
            return Err(PrimitiveError::InvalidProjectSlug {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectSlug {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identifier of a named entry inside a project configuration collection.
///
/// This is either the caller-supplied name or the canonical identifier the
/// server stored the entry under; both share the same shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Box<str>);

impl EntryId {
    /// Parse an entry identifier (trimmed, non-empty, no `/`).
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let Some(trimmed) = trimmed_non_empty(raw) else {
            return Err(PrimitiveError::InvalidEntryId {
                input_length: raw.len(),
            });
        };
        if trimmed.contains('/') {
            return Err(PrimitiveError::EntryIdContainsSlash {
                input: trimmed.to_owned(),
            });
        }

        Ok(Self(trimmed.to_owned().into_boxed_str()))
    }

    /// Adopt an identifier read back from a stored document.
    ///
    /// Server-assigned identifiers are kept verbatim (no trimming, `/`
    /// allowed); they address entries inside the document and never appear
    /// in a request path. Only the empty string is refused.
    #[must_use]
    pub fn from_stored(raw: &str) -> Option<Self> {
        (!raw.is_empty()).then(|| Self(raw.into()))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for EntryId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn trimmed_non_empty(input: &str) -> Option<&str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn is_valid_slug(input: &str) -> bool {
    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_lowercase() || first.is_ascii_digit()) {
        return false;
    }
    chars.all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_trimmed() -> Result<(), PrimitiveError> {
        assert_eq!(ProjectId::parse("  p-1 ")?.as_str(), "p-1");
        assert_eq!(WorkspaceId::parse("ws")?.to_string(), "ws");
        assert_eq!(EntryId::parse(" customer ")?.as_str(), "customer");
        Ok(())
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert_eq!(
            ProjectId::parse("   "),
            Err(PrimitiveError::InvalidProjectId { input_length: 3 })
        );
        assert!(WorkspaceId::parse("").is_err());
        assert!(EntryId::parse("\t").is_err());
    }

    #[test]
    fn entry_id_rejects_path_separators() {
        assert_eq!(
            EntryId::parse("a/b"),
            Err(PrimitiveError::EntryIdContainsSlash {
                input: "a/b".to_owned()
            })
        );
    }

    #[test]
    fn stored_ids_are_kept_verbatim() {
        assert_eq!(
            EntryId::from_stored("preset://email").map(|id| id.to_string()),
            Some("preset://email".to_owned())
        );
        assert_eq!(
            EntryId::from_stored(" padded ").map(|id| id.to_string()),
            Some(" padded ".to_owned())
        );
        assert_eq!(EntryId::from_stored(""), None);
    }

    #[test]
    fn slug_allows_lowercase_dns_labels() {
        assert!(ProjectSlug::parse("happy-cat-42").is_ok());
        assert!(ProjectSlug::parse("Happy").is_err());
        assert!(ProjectSlug::parse("-lead").is_err());
        assert!(ProjectSlug::parse("").is_err());
        assert!(ProjectSlug::parse("a.b").is_err());
    }

    #[test]
    fn primitive_error_maps_to_local_validation() {
        let envelope: ErrorEnvelope = PrimitiveError::InvalidProjectSlug {
            input: "Bad".to_owned(),
        }
        .into();
        assert_eq!(envelope.code.code(), "invalid_project_slug");
        assert_eq!(
            envelope.category,
            mgmt_client_shared::ErrorCategory::LocalValidation
        );
        assert_eq!(envelope.metadata_value("input"), Some("Bad"));
    }
}
