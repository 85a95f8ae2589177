//! Integration tests for env parsing and env-to-config merging.

use mgmt_client_config::{ClientConfig, ClientEnv, EnvParseError, apply_env_overrides};
use mgmt_client_domain::Backend;
use mgmt_client_shared::{ErrorCode, ErrorEnvelope, SecretString};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

fn read_env_map(relative: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("env")
        .join(relative);
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[test]
fn env_fixture_merges_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env = ClientEnv::from_map(&read_env_map("client-env.valid.json")?)?;
    let config = apply_env_overrides(ClientConfig::default(), &env)?;

    assert_eq!(
        config.base_url(Backend::Console).map(url::Url::as_str),
        Some("http://127.0.0.1:4434/")
    );
    assert_eq!(
        config.base_url(Backend::Tenant).map(url::Url::as_str),
        Some("https://env-slug.tenant.example.com/")
    );
    assert_eq!(config.console.timeout_ms, 12_000);
    assert_eq!(config.retry.max_attempts, 3);
    assert_eq!(config.resolver.max_attempts, 10);

    let credentials = env.credentials();
    assert_eq!(
        credentials.token(Backend::Tenant).map(SecretString::expose),
        Some("tenant-pat-123")
    );
    assert!(credentials.token(Backend::Console).is_none());
    Ok(())
}

#[test]
fn invalid_int_fixture_reports_env_var() -> Result<(), Box<dyn Error>> {
    let error = ClientEnv::from_map(&read_env_map("client-env.invalid-int.json")?)
        .err()
        .ok_or_else(|| std::io::Error::other("expected parse error"))?;
    assert!(matches!(error, EnvParseError::InvalidInt { .. }));

    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_int"));
    assert_eq!(
        envelope.metadata_value("env_var"),
        Some("MGMT_RESOLVER_MAX_ATTEMPTS")
    );
    assert_eq!(envelope.metadata_value("value"), Some("many"));
    Ok(())
}

#[test]
fn env_values_still_pass_schema_validation() -> Result<(), Box<dyn Error>> {
    let mut map = BTreeMap::new();
    map.insert("MGMT_RESOLVER_MAX_ATTEMPTS".to_string(), "11".to_string());
    let env = ClientEnv::from_map(&map)?;

    let error = apply_env_overrides(ClientConfig::default(), &env)
        .err()
        .ok_or_else(|| std::io::Error::other("expected limit error"))?;
    assert_eq!(error.code, ErrorCode::new("config", "invalid_limit"));
    assert_eq!(error.metadata_value("section"), Some("resolver"));
    Ok(())
}
