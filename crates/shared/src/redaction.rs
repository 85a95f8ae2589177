//! Secret handling for bearer tokens and credential-bearing variables.

/// Placeholder written wherever a secret would appear.
pub const REDACTED: &str = "[REDACTED]";

/// Whether a variable or metadata key names a credential.
///
/// ```
/// use mgmt_client_shared::is_secret_key;
///
/// assert!(is_secret_key("MGMT_TENANT_API_KEY"));
/// assert!(is_secret_key("client_secret"));
/// assert!(!is_secret_key("MGMT_PROJECT_SLUG"));
/// ```
pub fn is_secret_key(key: &str) -> bool {
    const MARKERS: [&str; 6] = ["KEY", "TOKEN", "SECRET", "PASSWORD", "CREDENTIAL", "AUTH"];
    let key = key.to_ascii_uppercase();
    MARKERS.iter().any(|marker| key.contains(marker))
}

/// A token that never prints its value.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SecretString(Box<str>);

impl SecretString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<Box<str>>) -> Self {
        Self(value.into())
    }

    /// The raw value, for building an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace only; such tokens count as absent.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(REDACTED)
    }
}

impl From<Box<str>> for SecretString {
    fn from(value: Box<str>) -> Self {
        Self(value)
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value.into_boxed_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_variables_are_secret() {
        for key in ["MGMT_CONSOLE_API_KEY", "bearer_token", "Authorization"] {
            assert!(is_secret_key(key), "{key}");
        }
        for key in ["MGMT_CONSOLE_BASE_URL", "MGMT_WORKSPACE_ID", "MGMT_TIMEOUT_MS"] {
            assert!(!is_secret_key(key), "{key}");
        }
    }

    #[test]
    fn secret_string_never_prints_its_value() {
        let secret = SecretString::new("ory_pat_123");
        assert_eq!(secret.to_string(), REDACTED);
        assert_eq!(format!("{secret:?}"), REDACTED);
        assert_eq!(secret.expose(), "ory_pat_123");
        assert!(SecretString::new(" ").is_blank());
    }
}
