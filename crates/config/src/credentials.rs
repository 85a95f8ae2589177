//! Bearer credentials for the two backends.
//!
//! Tokens never live in the config file; they come from the environment or
//! from the caller.

use mgmt_client_domain::Backend;
use mgmt_client_shared::SecretString;

/// Bearer tokens per backend. Either may be absent; a backend without a
/// token is left unconfigured and its operations fail at call time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    /// Console bearer token.
    pub console_token: Option<SecretString>,
    /// Tenant bearer token.
    pub tenant_token: Option<SecretString>,
}

impl ClientCredentials {
    /// Credentials with both tokens set.
    pub fn new(console_token: impl Into<SecretString>, tenant_token: impl Into<SecretString>) -> Self {
        Self {
            console_token: Some(console_token.into()),
            tenant_token: Some(tenant_token.into()),
        }
    }

    /// Token for the given backend, ignoring blank values.
    #[must_use]
    pub fn token(&self, backend: Backend) -> Option<&SecretString> {
        let token = match backend {
            Backend::Console => self.console_token.as_ref(),
            Backend::Tenant => self.tenant_token.as_ref(),
        };
        token.filter(|token| !token.is_blank())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tokens_are_treated_as_absent() {
        let credentials = ClientCredentials::new(String::from("console-pat"), String::from("  "));
        assert_eq!(
            credentials.token(Backend::Console).map(SecretString::expose),
            Some("console-pat")
        );
        assert!(credentials.token(Backend::Tenant).is_none());
    }

    #[test]
    fn debug_output_never_shows_tokens() {
        let credentials = ClientCredentials::new(String::from("console-pat"), String::from("tenant-pat"));
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("console-pat"));
        assert!(!rendered.contains("tenant-pat"));
    }
}
