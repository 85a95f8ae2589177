//! Remote resource shapes the client reads and writes.
//!
//! Fields beyond identity are kept as opaque JSON; their schema belongs to the
//! caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One of the two independently addressed REST services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Workspace and project administration.
    Console,
    /// Per-project tenant administration (OAuth2 clients).
    Tenant,
}

impl Backend {
    /// Both backends.
    pub const ALL: [Self; 2] = [Self::Console, Self::Tenant];

    /// Stable label used in errors and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Tenant => "tenant",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Summary row returned when listing a workspace's projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    /// Project identifier.
    pub id: String,
    /// DNS slug.
    #[serde(default)]
    pub slug: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Lifecycle state reported by the console.
    #[serde(default)]
    pub state: Option<String>,
}

/// OAuth2 client registered on the tenant backend.
///
/// `client_id` is assigned by the server on create; every other field is
/// passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OAuth2Client {
    /// Server-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    /// Remaining client fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl OAuth2Client {
    /// A client with only a name set.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            client_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set an additional field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}
