//! Carta driver configuration types.

use crate::error::{CartaError, CartaResult};
use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://auth.carta.id/authorize";
pub const DEFAULT_ACCESS_TOKEN_URL: &str = "https://api.auth.carta.id/auth/exchangeToken";
pub const DEFAULT_USER_INFO_URL: &str = "https://api.auth.carta.id/auth/me";

/// Upper bound for `state_ttl_seconds`: one day.
pub const MAX_STATE_TTL_SECONDS: u64 = 86_400;

/// Credentials and endpoints for the Carta application.
///
/// Endpoint overrides must not carry a query string; the driver adds every
/// parameter itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub callback_url: String,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub access_token_url: Option<String>,
    #[serde(default)]
    pub user_info_url: Option<String>,
}

impl ProviderConfig {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            callback_url: callback_url.into(),
            authorize_url: None,
            access_token_url: None,
            user_info_url: None,
        }
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = Some(url.into());
        self
    }

    pub fn with_access_token_url(mut self, url: impl Into<String>) -> Self {
        self.access_token_url = Some(url.into());
        self
    }

    pub fn with_user_info_url(mut self, url: impl Into<String>) -> Self {
        self.user_info_url = Some(url.into());
        self
    }

    pub fn authorize_url(&self) -> &str {
        self.authorize_url.as_deref().unwrap_or(DEFAULT_AUTHORIZE_URL)
    }

    pub fn access_token_url(&self) -> &str {
        self.access_token_url
            .as_deref()
            .unwrap_or(DEFAULT_ACCESS_TOKEN_URL)
    }

    pub fn user_info_url(&self) -> &str {
        self.user_info_url.as_deref().unwrap_or(DEFAULT_USER_INFO_URL)
    }

    pub fn validate(&self) -> CartaResult<()> {
        for (name, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("callback_url", &self.callback_url),
        ] {
            if value.trim().is_empty() {
                return Err(CartaError::Config(format!("{} must not be empty", name)));
            }
        }

        Url::parse(&self.callback_url)?;
        Url::parse(self.access_token_url())?;
        Url::parse(self.user_info_url())?;

        let authorize = Url::parse(self.authorize_url())?;
        if authorize.query().is_some() {
            return Err(CartaError::Config(
                "authorize_url must not contain a query string".to_string(),
            ));
        }

        Ok(())
    }
}

/// Driver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartaConfig {
    pub provider: ProviderConfig,
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: u64,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_state_ttl() -> u64 {
    600 // 10 minutes
}

fn default_http_timeout() -> u64 {
    30
}

impl CartaConfig {
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            state_ttl_seconds: default_state_ttl(),
            http_timeout_seconds: default_http_timeout(),
        }
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    /// Load configuration from an optional TOML file, overridden by
    /// `CARTA__`-prefixed environment variables (e.g. `CARTA__PROVIDER__CLIENT_ID`).
    pub fn load(path: Option<&Path>) -> CartaResult<Self> {
        let mut builder = ConfigBuilder::builder();

        match path {
            Some(path) if path.exists() => {
                info!("Loading Carta configuration from {}", path.display());
                builder = builder.add_source(File::from(path));
            }
            Some(path) => {
                debug!("No config file found at {}, using environment", path.display());
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("CARTA")
                .separator("__")
                .try_parsing(true),
        );

        let config: CartaConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CartaResult<()> {
        if self.state_ttl_seconds == 0 || self.state_ttl_seconds > MAX_STATE_TTL_SECONDS {
            return Err(CartaError::Config(format!(
                "state_ttl_seconds must be between 1 and {}",
                MAX_STATE_TTL_SECONDS
            )));
        }
        if self.http_timeout_seconds == 0 {
            return Err(CartaError::Config(
                "http_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        self.provider.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn provider() -> ProviderConfig {
        ProviderConfig::new("client", "secret", "http://localhost:3000/carta/callback")
    }

    #[test]
    fn test_default_endpoints() {
        let config = provider();
        assert_eq!(config.authorize_url(), DEFAULT_AUTHORIZE_URL);
        assert_eq!(config.access_token_url(), DEFAULT_ACCESS_TOKEN_URL);
        assert_eq!(config.user_info_url(), DEFAULT_USER_INFO_URL);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_overrides() {
        let config = provider()
            .with_authorize_url("http://127.0.0.1:9000/authorize")
            .with_user_info_url("http://127.0.0.1:9000/me");

        assert_eq!(config.authorize_url(), "http://127.0.0.1:9000/authorize");
        assert_eq!(config.access_token_url(), DEFAULT_ACCESS_TOKEN_URL);
        assert_eq!(config.user_info_url(), "http://127.0.0.1:9000/me");
    }

    #[test]
    fn test_authorize_url_with_query_is_rejected() {
        let config = provider().with_authorize_url("https://auth.carta.id/authorize?foo=bar");
        assert!(matches!(config.validate(), Err(CartaError::Config(_))));
    }

    #[test]
    fn test_missing_credentials_are_rejected() {
        let config = ProviderConfig::new("", "secret", "http://localhost/cb");
        assert!(matches!(config.validate(), Err(CartaError::Config(_))));

        let config = ProviderConfig::new("client", "secret", "not a url");
        assert!(matches!(config.validate(), Err(CartaError::Url(_))));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config = CartaConfig::new(provider()).with_http_timeout(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_ttl_bounds() {
        let config = CartaConfig::new(provider()).with_state_ttl(0);
        assert!(matches!(config.validate(), Err(CartaError::Config(_))));

        let config = CartaConfig::new(provider()).with_state_ttl(10_000_000_000_000);
        assert!(matches!(config.validate(), Err(CartaError::Config(_))));

        let config = CartaConfig::new(provider()).with_state_ttl(MAX_STATE_TTL_SECONDS);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_rejects_oversized_state_ttl() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
state_ttl_seconds = 10000000000000

[provider]
client_id = "file-client"
client_secret = "file-secret"
callback_url = "http://localhost:3000/carta/callback"
"#
        )
        .unwrap();

        let result = CartaConfig::load(Some(file.path()));
        assert!(matches!(result, Err(CartaError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
state_ttl_seconds = 120

[provider]
client_id = "file-client"
client_secret = "file-secret"
callback_url = "http://localhost:3000/carta/callback"
user_info_url = "http://localhost:9999/auth/me"
"#
        )
        .unwrap();

        let config = CartaConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.provider.client_id, "file-client");
        assert_eq!(config.state_ttl_seconds, 120);
        assert_eq!(config.http_timeout_seconds, 30);
        assert_eq!(config.provider.user_info_url(), "http://localhost:9999/auth/me");
        assert_eq!(config.provider.authorize_url(), DEFAULT_AUTHORIZE_URL);
    }
}
