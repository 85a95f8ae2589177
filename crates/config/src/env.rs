//! Environment variable parsing and env-to-config merging.
//!
//! Parsing is strict: a variable that is present must hold a valid value.
//! Empty values are errors rather than silent unsets.

use crate::credentials::ClientCredentials;
use crate::schema::{ClientConfig, ValidatedClientConfig};
use mgmt_client_shared::{ErrorCode, ErrorEnvelope, REDACTED, SecretString, is_secret_key};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Env var: console base URL.
pub const ENV_CONSOLE_BASE_URL: &str = "MGMT_CONSOLE_BASE_URL";
/// Env var: tenant base URL.
pub const ENV_TENANT_BASE_URL: &str = "MGMT_TENANT_BASE_URL";
/// Env var: console bearer token.
pub const ENV_CONSOLE_API_KEY: &str = "MGMT_CONSOLE_API_KEY";
/// Env var: tenant bearer token.
pub const ENV_TENANT_API_KEY: &str = "MGMT_TENANT_API_KEY";
/// Env var: project identifier.
pub const ENV_PROJECT_ID: &str = "MGMT_PROJECT_ID";
/// Env var: project slug.
pub const ENV_PROJECT_SLUG: &str = "MGMT_PROJECT_SLUG";
/// Env var: workspace identifier.
pub const ENV_WORKSPACE_ID: &str = "MGMT_WORKSPACE_ID";
/// Env var: per-request timeout applied to both backends (ms).
pub const ENV_TIMEOUT_MS: &str = "MGMT_TIMEOUT_MS";
/// Env var: retry max attempts.
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "MGMT_RETRY_MAX_ATTEMPTS";
/// Env var: resolver max poll ticks.
pub const ENV_RESOLVER_MAX_ATTEMPTS: &str = "MGMT_RESOLVER_MAX_ATTEMPTS";

const ALL_VARS: [&str; 10] = [
    ENV_CONSOLE_BASE_URL,
    ENV_TENANT_BASE_URL,
    ENV_CONSOLE_API_KEY,
    ENV_TENANT_API_KEY,
    ENV_PROJECT_ID,
    ENV_PROJECT_SLUG,
    ENV_WORKSPACE_ID,
    ENV_TIMEOUT_MS,
    ENV_RETRY_MAX_ATTEMPTS,
    ENV_RESOLVER_MAX_ATTEMPTS,
];

/// Typed env-derived overrides for `ClientConfig` plus credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientEnv {
    /// Override for `console.baseUrl`.
    pub console_base_url: Option<Box<str>>,
    /// Override for `tenant.baseUrl`.
    pub tenant_base_url: Option<Box<str>>,
    /// Console bearer token.
    pub console_api_key: Option<SecretString>,
    /// Tenant bearer token.
    pub tenant_api_key: Option<SecretString>,
    /// Override for `scope.projectId`.
    pub project_id: Option<Box<str>>,
    /// Override for `scope.projectSlug`.
    pub project_slug: Option<Box<str>>,
    /// Override for `scope.workspaceId`.
    pub workspace_id: Option<Box<str>>,
    /// Override for `console.timeoutMs` and `tenant.timeoutMs`.
    pub timeout_ms: Option<u64>,
    /// Override for `retry.maxAttempts`.
    pub retry_max_attempts: Option<u32>,
    /// Override for `resolver.maxAttempts`.
    pub resolver_max_attempts: Option<u32>,
}

impl ClientEnv {
    /// Parse env overrides from a key/value map (useful for tests and fixtures).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            console_base_url: parse_optional_url_string(map, ENV_CONSOLE_BASE_URL)?,
            tenant_base_url: parse_optional_url_string(map, ENV_TENANT_BASE_URL)?,
            console_api_key: parse_optional_secret(map, ENV_CONSOLE_API_KEY)?,
            tenant_api_key: parse_optional_secret(map, ENV_TENANT_API_KEY)?,
            project_id: parse_optional_trimmed_string(map, ENV_PROJECT_ID)?,
            project_slug: parse_optional_trimmed_string(map, ENV_PROJECT_SLUG)?,
            workspace_id: parse_optional_trimmed_string(map, ENV_WORKSPACE_ID)?,
            timeout_ms: parse_optional_u64(map, ENV_TIMEOUT_MS)?,
            retry_max_attempts: parse_optional_u32(map, ENV_RETRY_MAX_ATTEMPTS)?,
            resolver_max_attempts: parse_optional_u32(map, ENV_RESOLVER_MAX_ATTEMPTS)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let mut map = BTreeMap::new();
        for name in ALL_VARS {
            if let Ok(value) = std::env::var(name) {
                map.insert(name.to_string(), value);
            }
        }

        Self::from_map(&map)
    }

    /// Bearer tokens carried by the environment.
    #[must_use]
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            console_token: self.console_api_key.clone(),
            tenant_token: self.tenant_api_key.clone(),
        }
    }
}

/// Apply env overrides to a base config (env wins over file/default values).
pub fn apply_env_overrides(
    base: ClientConfig,
    env: &ClientEnv,
) -> Result<ValidatedClientConfig, ErrorEnvelope> {
    let mut config = base;

    set_string(&mut config.console.base_url, env.console_base_url.as_deref());
    set_string(&mut config.tenant.base_url, env.tenant_base_url.as_deref());
    set_string(&mut config.scope.project_id, env.project_id.as_deref());
    set_string(&mut config.scope.project_slug, env.project_slug.as_deref());
    set_string(&mut config.scope.workspace_id, env.workspace_id.as_deref());

    if let Some(timeout_ms) = env.timeout_ms {
        config.console.timeout_ms = timeout_ms;
        config.tenant.timeout_ms = timeout_ms;
    }
    if let Some(max_attempts) = env.retry_max_attempts {
        config.retry.max_attempts = max_attempts;
    }
    if let Some(max_attempts) = env.resolver_max_attempts {
        config.resolver.max_attempts = max_attempts;
    }

    config.validate_and_normalize().map_err(Into::into)
}

fn set_string(target: &mut Option<Box<str>>, value: Option<&str>) {
    if let Some(value) = value {
        *target = Some(value.into());
    }
}

/// Validation failures when parsing env variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// A secret env var was present but empty after trimming.
    EmptySecret {
        /// Env var name.
        var: &'static str,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// URL env var had an invalid value.
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } | Self::EmptySecret { .. } => {
                ErrorCode::new("config", "empty_env_var")
            },
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_env_url"),
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } | Self::EmptySecret { var } => {
                write!(formatter, "{var} must be non-empty")
            },
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
            Self::InvalidUrl { var, .. } => write!(formatter, "{var} must be a valid URL"),
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let code = error.error_code();
        let message = error.to_string();
        let mut envelope = Self::expected(code, message);

        match error {
            EnvParseError::EmptyValue { var } | EnvParseError::EmptySecret { var } => {
                envelope = envelope.with_metadata("env_var", var);
            },
            EnvParseError::InvalidInt { var, value } | EnvParseError::InvalidUrl { var, value } => {
                envelope = envelope
                    .with_metadata("env_var", var)
                    .with_metadata("value", redact_value(var, &value));
            },
        }

        envelope
    }
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    Ok(Some(trimmed.to_owned().into_boxed_str()))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptySecret { var });
    }

    Ok(Some(SecretString::new(trimmed.to_owned())))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_u32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u32>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    trimmed
        .parse::<u32>()
        .map(Some)
        .map_err(|_| EnvParseError::InvalidInt {
            var,
            value: raw.clone(),
        })
}

fn parse_optional_url_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }

    let parsed = Url::parse(trimmed).map_err(|_| EnvParseError::InvalidUrl {
        var,
        value: raw.clone(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(EnvParseError::InvalidUrl {
            var,
            value: raw.clone(),
        });
    }

    Ok(Some(parsed.to_string().into_boxed_str()))
}

fn redact_value(var: &str, value: &str) -> String {
    if is_secret_key(var) {
        REDACTED.to_string()
    } else {
        value.to_string()
    }
}
