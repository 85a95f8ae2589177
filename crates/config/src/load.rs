//! Config loading helpers (file + env).
//!
//! The loader is responsible for deterministic merge order and surfacing
//! user-facing errors as typed `ErrorEnvelope`s.

use crate::credentials::ClientCredentials;
use crate::env::{ClientEnv, apply_env_overrides};
use crate::schema::{ClientConfig, ValidatedClientConfig};
use mgmt_client_shared::{ErrorCategory, ErrorCode, ErrorEnvelope};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Json,
    Toml,
}

/// Load the client config from in-memory sources.
///
/// Precedence (highest wins):
/// - env overrides (`ClientEnv`)
/// - config JSON
/// - defaults (`ClientConfig::default()`)
pub fn load_client_config_from_sources(
    config_json: Option<&str>,
    env: &ClientEnv,
) -> Result<ValidatedClientConfig, ErrorEnvelope> {
    let config = match config_json {
        None => ClientConfig::default(),
        Some(input) => parse_config_unvalidated(input, ConfigFormat::Json)?,
    };

    apply_env_overrides(config, env)
}

/// Load the client config from an optional file path (`.json` or `.toml`).
pub fn load_client_config_from_path(
    config_path: Option<&Path>,
    env: &ClientEnv,
) -> Result<ValidatedClientConfig, ErrorEnvelope> {
    let config = match config_path {
        None => ClientConfig::default(),
        Some(path) => {
            let config_text = read_config_file(path)?;
            let format = detect_config_format(path)?;
            parse_config_unvalidated(&config_text, format)?
        },
    };

    let validated = apply_env_overrides(config, env)?;
    tracing::debug!(
        path = ?config_path,
        tenant_configured = validated.scope().project_slug.is_some()
            || validated.tenant.base_url.is_some(),
        "client config loaded"
    );
    Ok(validated)
}

/// Load the client config and credentials from std env and an optional file path.
pub fn load_client_config_std_env(
    config_path: Option<&Path>,
) -> Result<(ValidatedClientConfig, ClientCredentials), ErrorEnvelope> {
    let env = ClientEnv::from_std_env().map_err(ErrorEnvelope::from)?;
    let config = load_client_config_from_path(config_path, &env)?;
    Ok((config, env.credentials()))
}

/// Serialize the config as deterministic pretty JSON (with trailing newline).
pub fn to_pretty_json(config: &ClientConfig) -> Result<String, ErrorEnvelope> {
    let mut output = serde_json::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::internal(),
            format!("failed to serialize config: {error}"),
            ErrorCategory::Other,
        )
    })?;
    output.push('\n');
    Ok(output)
}

/// Serialize the config as deterministic pretty TOML (with trailing newline).
pub fn to_pretty_toml(config: &ClientConfig) -> Result<String, ErrorEnvelope> {
    let mut output = toml::to_string_pretty(config).map_err(|error| {
        ErrorEnvelope::unexpected(
            ErrorCode::new("config", "serialize_toml"),
            format!("failed to serialize config TOML: {error}"),
            ErrorCategory::Other,
        )
    })?;
    output.push('\n');
    Ok(output)
}

fn parse_config_unvalidated(input: &str, format: ConfigFormat) -> Result<ClientConfig, ErrorEnvelope> {
    match format {
        ConfigFormat::Json => serde_json::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_json"),
                format!("invalid config JSON: {error}"),
            )
            .with_metadata("source", "config")
        }),
        ConfigFormat::Toml => toml::from_str(input).map_err(|error| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "invalid_toml"),
                format!("invalid config TOML: {error}"),
            )
            .with_metadata("source", "config")
        }),
    }
}

fn read_config_file(path: &Path) -> Result<String, ErrorEnvelope> {
    std::fs::read_to_string(path).map_err(|error| {
        let code = match error.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::new("config", "config_file_not_found"),
            std::io::ErrorKind::PermissionDenied => {
                ErrorCode::new("config", "config_file_permission_denied")
            },
            _ => ErrorCode::new("config", "config_file_io"),
        };

        ErrorEnvelope::expected(code, format!("failed to read config file: {error}"))
            .with_metadata("path", path.to_string_lossy().to_string())
    })
}

fn detect_config_format(path: &Path) -> Result<ConfigFormat, ErrorEnvelope> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        None | Some("json") => Ok(ConfigFormat::Json),
        Some("toml") => Ok(ConfigFormat::Toml),
        Some(other) => Err(ErrorEnvelope::expected(
            ErrorCode::new("config", "unsupported_format"),
            "unsupported config format; use .json or .toml",
        )
        .with_metadata("extension", other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn format_is_detected_from_extension() -> Result<(), Box<dyn Error>> {
        assert_eq!(detect_config_format(Path::new("client.json"))?, ConfigFormat::Json);
        assert_eq!(detect_config_format(Path::new("client.TOML"))?, ConfigFormat::Toml);
        assert_eq!(detect_config_format(Path::new("client"))?, ConfigFormat::Json);

        let error = detect_config_format(Path::new("client.yaml"))
            .err()
            .ok_or_else(|| std::io::Error::other("expected format error"))?;
        assert_eq!(error.code, ErrorCode::new("config", "unsupported_format"));
        assert_eq!(error.metadata_value("extension"), Some("yaml"));
        Ok(())
    }

    #[test]
    fn env_wins_over_config_json() -> Result<(), Box<dyn Error>> {
        let env = ClientEnv {
            project_slug: Some("from-env".into()),
            ..ClientEnv::default()
        };
        let config = load_client_config_from_sources(
            Some(r#"{"scope": {"projectSlug": "from-file"}, "retry": {"maxAttempts": 2}}"#),
            &env,
        )?;

        assert_eq!(config.scope.project_slug.as_deref(), Some("from-env"));
        assert_eq!(config.retry.max_attempts, 2);
        Ok(())
    }

    #[test]
    fn missing_file_has_stable_code() -> Result<(), Box<dyn Error>> {
        let error = load_client_config_from_path(
            Some(Path::new("/definitely/not/here/client.json")),
            &ClientEnv::default(),
        )
        .err()
        .ok_or_else(|| std::io::Error::other("expected io error"))?;
        assert_eq!(error.code, ErrorCode::new("config", "config_file_not_found"));
        Ok(())
    }

    #[test]
    fn pretty_json_round_trips_defaults() -> Result<(), Box<dyn Error>> {
        let rendered = to_pretty_json(&ClientConfig::default())?;
        assert!(rendered.ends_with('\n'));
        let reparsed: ClientConfig = serde_json::from_str(&rendered)?;
        assert_eq!(reparsed, ClientConfig::default());
        Ok(())
    }
}
