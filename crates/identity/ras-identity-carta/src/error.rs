//! Carta driver error types.

use thiserror::Error;

pub type CartaResult<T> = Result<T, CartaError>;

#[derive(Debug, Error)]
pub enum CartaError {
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    /// The user refused the authorization request. This is an expected
    /// outcome, not a fault.
    #[error("Access denied by user")]
    AccessDenied,

    #[error("Callback carries neither an authorization code nor an error")]
    MalformedCallback,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid state parameter")]
    StateMismatch,

    #[error("State cookie store error: {0}")]
    StateStore(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Access token must not be empty")]
    InvalidToken,
}

impl CartaError {
    /// True when the flow ended because the user declined access.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, CartaError::AccessDenied)
    }
}

impl From<reqwest::Error> for CartaError {
    fn from(err: reqwest::Error) -> Self {
        CartaError::Transport(err.to_string())
    }
}

impl From<config::ConfigError> for CartaError {
    fn from(err: config::ConfigError) -> Self {
        CartaError::Config(err.to_string())
    }
}
