//! # mgmt-client-config
//!
//! Configuration schema, validation, and loading for the management client.
//! This crate depends on `domain` and `shared` only.

/// Bearer credentials per backend.
pub mod credentials;
/// Environment variable parsing and merging.
pub mod env;
/// Config loading helpers (file + env).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use credentials::ClientCredentials;
pub use env::{ClientEnv, EnvParseError, apply_env_overrides};
pub use load::{
    load_client_config_from_path, load_client_config_from_sources, load_client_config_std_env,
    to_pretty_json, to_pretty_toml,
};
pub use schema::{
    CURRENT_CONFIG_VERSION, ClientConfig, ConfigSchemaError, DEFAULT_CONSOLE_BASE_URL,
    EndpointConfig, ResolverConfig, RetryConfig, ScopeConfig, SnapshotCacheConfig,
    TENANT_HOST_SUFFIX, ValidatedClientConfig, ValidatedScope, parse_client_config_json,
    parse_client_config_toml,
};

/// Returns the config crate version.
#[must_use]
pub const fn config_crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
