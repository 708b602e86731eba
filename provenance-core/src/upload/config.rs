//! Upload provider configuration.

use std::fmt;
use std::time::Duration;

use zeroize::Zeroizing;

use crate::mask::redact;
use crate::retry::BackoffPolicy;

/// Default per-request timeout for provider uploads.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// How a provider authenticates upload requests.
#[derive(Clone, Default)]
pub enum AuthScheme {
    #[default]
    None,
    /// `Authorization: Bearer <token>`.
    Bearer { token: Zeroizing<String> },
    /// A key/secret pair sent in two provider-specific headers.
    KeySecret {
        key_header: String,
        key: Zeroizing<String>,
        secret_header: String,
        secret: Zeroizing<String>,
    },
}

impl AuthScheme {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: Zeroizing::new(token.into()),
        }
    }

    pub fn key_secret(
        key_header: impl Into<String>,
        key: impl Into<String>,
        secret_header: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self::KeySecret {
            key_header: key_header.into(),
            key: Zeroizing::new(key.into()),
            secret_header: secret_header.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    /// Apply the credentials to an outgoing request.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Self::None => request,
            Self::Bearer { token } => request.bearer_auth(token.as_str()),
            Self::KeySecret {
                key_header,
                key,
                secret_header,
                secret,
            } => request
                .header(key_header.as_str(), key.as_str())
                .header(secret_header.as_str(), secret.as_str()),
        }
    }
}

impl fmt::Debug for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bearer { token } => f
                .debug_struct("Bearer")
                .field("token", &redact(token))
                .finish(),
            Self::KeySecret {
                key_header,
                key,
                secret_header,
                secret,
            } => f
                .debug_struct("KeySecret")
                .field("key_header", key_header)
                .field("key", &redact(key))
                .field("secret_header", secret_header)
                .field("secret", &redact(secret))
                .finish(),
        }
    }
}

/// One content-addressed store endpoint. Loaded at startup, never mutated.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub endpoint: String,
    pub auth: AuthScheme,
    /// Lower values are tried first.
    pub priority: u32,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, priority: u32) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            auth: AuthScheme::None,
            priority,
            timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Provider pool plus the retry policy applied to each provider.
#[derive(Debug, Clone, Default)]
pub struct UploadConfig {
    pub providers: Vec<ProviderConfig>,
    pub policy: BackoffPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let config = ProviderConfig::new("pinata", "https://api.pinata.cloud/pinning", 0)
            .with_auth(AuthScheme::key_secret(
                "pinata_api_key",
                "pk-visible-key",
                "pinata_secret_api_key",
                "sk-hidden-secret",
            ));
        let debug = format!("{config:?}");
        assert!(!debug.contains("pk-visible-key"));
        assert!(!debug.contains("sk-hidden-secret"));
        assert!(debug.contains("pinata_api_key"));

        let bearer = format!("{:?}", AuthScheme::bearer("jwt-token-value"));
        assert!(!bearer.contains("jwt-token-value"));
    }
}
