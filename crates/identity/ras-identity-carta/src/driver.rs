//! Carta OAuth2 driver.
//!
//! A driver is built for each incoming request. The redirect request issues and
//! stores the state value; the callback request loads it back, exchanges the
//! authorization code and fetches the user profile.

use crate::config::{CartaConfig, ProviderConfig};
use crate::error::{CartaError, CartaResult};
use crate::http::{HttpTransport, ReqwestTransport};
use crate::redirect::{AuthorizationRequestBuilder, RedirectRequest, STATE_PARAM};
use crate::state::{NoOpStateValidator, StateCookieStore, StateManager};
use crate::token::TokenExchangeClient;
use crate::types::{AccessToken, UserProfile};
use crate::user::{ProfileShape, RequestCustomizer, UserProfileFetcher};
use axum::http::Uri;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Query parameter carrying the authorization code on the callback.
pub const CODE_PARAM: &str = "authorization_code";
/// Input field carrying the error on the callback.
pub const ERROR_PARAM: &str = "error";
/// Error value Carta sends when the user refuses access.
pub const ACCESS_DENIED_ERROR: &str = "user_denied";

/// Read access to the incoming callback request.
pub trait CallbackInput {
    /// Value from the query string only
    fn query(&self, name: &str) -> Option<String>;

    /// Value from the query string or the parsed body
    fn input(&self, name: &str) -> Option<String> {
        self.query(name)
    }
}

impl CallbackInput for HashMap<String, String> {
    fn query(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Query string and body fields of a callback request
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    query: HashMap<String, String>,
    body: HashMap<String, String>,
}

impl CallbackRequest {
    pub fn new(query: HashMap<String, String>) -> Self {
        Self {
            query,
            body: HashMap::new(),
        }
    }

    pub fn from_uri(uri: &Uri) -> Self {
        let query = uri
            .query()
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();
        Self::new(query)
    }

    pub fn with_body(mut self, body: HashMap<String, String>) -> Self {
        self.body = body;
        self
    }
}

impl CallbackInput for CallbackRequest {
    fn query(&self, name: &str) -> Option<String> {
        self.query.get(name).cloned()
    }

    fn input(&self, name: &str) -> Option<String> {
        self.query
            .get(name)
            .or_else(|| self.body.get(name))
            .cloned()
    }
}

/// What the provider reported on the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Code(String),
    AccessDenied,
    ProviderError(String),
    Malformed,
}

pub struct CartaDriver {
    state: StateManager,
    authorization: AuthorizationRequestBuilder,
    token_client: TokenExchangeClient,
    profile_fetcher: UserProfileFetcher,
}

impl CartaDriver {
    /// Fails with [`CartaError::Config`] when the provider settings are invalid.
    pub fn new(
        provider: Arc<ProviderConfig>,
        state_ttl_seconds: u64,
        transport: Arc<dyn HttpTransport>,
        cookies: Arc<dyn StateCookieStore>,
    ) -> CartaResult<Self> {
        provider.validate()?;
        Ok(Self {
            state: StateManager::new(cookies, Arc::new(NoOpStateValidator), state_ttl_seconds),
            authorization: AuthorizationRequestBuilder::new(provider.clone()),
            token_client: TokenExchangeClient::new(provider.clone(), transport.clone()),
            profile_fetcher: UserProfileFetcher::new(provider, transport),
        })
    }

    /// Read the state cookie left by the redirect request and clear it.
    /// Must run once before handling a callback.
    pub async fn load_state(&mut self) -> CartaResult<()> {
        self.state.load().await
    }

    pub fn state_value(&self) -> Option<&str> {
        self.state.current_value()
    }

    pub async fn initiate_redirect<S: AsRef<str>>(
        &self,
        scopes: &[S],
    ) -> CartaResult<RedirectRequest> {
        self.initiate_redirect_with(scopes, |_| {}).await
    }

    /// Like [`initiate_redirect`](Self::initiate_redirect), letting the caller
    /// adjust the request after the driver's own configuration.
    pub async fn initiate_redirect_with<S, F>(
        &self,
        scopes: &[S],
        configure: F,
    ) -> CartaResult<RedirectRequest>
    where
        S: AsRef<str>,
        F: FnOnce(&mut RedirectRequest),
    {
        let state = self.state.issue();
        self.state.persist(&state).await?;

        let mut request = self.authorization.build(&state, scopes);
        configure(&mut request);

        info!("Issued Carta authorization redirect");
        Ok(request)
    }

    pub fn callback_outcome(&self, input: &impl CallbackInput) -> CallbackOutcome {
        if let Some(error) = input.input(ERROR_PARAM).filter(|e| !e.is_empty()) {
            return if error == ACCESS_DENIED_ERROR {
                CallbackOutcome::AccessDenied
            } else {
                CallbackOutcome::ProviderError(error)
            };
        }

        match input.query(CODE_PARAM).filter(|c| !c.is_empty()) {
            Some(code) => CallbackOutcome::Code(code),
            None => CallbackOutcome::Malformed,
        }
    }

    pub fn access_denied(&self, input: &impl CallbackInput) -> bool {
        self.callback_outcome(input) == CallbackOutcome::AccessDenied
    }

    /// Always false for Carta, see [`NoOpStateValidator`].
    pub fn state_mismatch(&self, input: &impl CallbackInput) -> bool {
        !self.state.matches(input.query(STATE_PARAM).as_deref())
    }

    /// Validate the callback and exchange its code for an access token.
    pub async fn access_token(&self, input: &impl CallbackInput) -> CartaResult<AccessToken> {
        let code = match self.callback_outcome(input) {
            CallbackOutcome::Code(code) => code,
            CallbackOutcome::AccessDenied => {
                warn!("Carta login denied by user");
                return Err(CartaError::AccessDenied);
            }
            CallbackOutcome::ProviderError(error) => {
                warn!("Carta callback returned error: {}", error);
                return Err(CartaError::Provider(error));
            }
            CallbackOutcome::Malformed => return Err(CartaError::MalformedCallback),
        };

        if self.state_mismatch(input) {
            return Err(CartaError::StateMismatch);
        }
        debug!(has_state = self.state.current_value().is_some(), "State check passed");

        self.token_client
            .exchange(&code, self.state.current_value())
            .await
    }

    /// Complete the login from the provider's callback.
    pub async fn complete_from_callback(
        &self,
        input: &impl CallbackInput,
        customizer: Option<&RequestCustomizer>,
    ) -> CartaResult<UserProfile> {
        let token = self.access_token(input).await?;
        let profile = self
            .profile_fetcher
            .fetch(token, ProfileShape::Enveloped, customizer)
            .await?;

        info!("Completed Carta login for user {}", profile.id);
        Ok(profile)
    }

    /// Fetch the profile for a token obtained outside this flow.
    pub async fn fetch_profile_by_token(
        &self,
        raw_token: &str,
        customizer: Option<&RequestCustomizer>,
    ) -> CartaResult<UserProfile> {
        let token = AccessToken::bearer(raw_token)?;
        self.profile_fetcher
            .fetch(token, ProfileShape::Flat, customizer)
            .await
    }
}

/// Shared, immutable driver settings; hands out one driver per request.
#[derive(Clone)]
pub struct CartaDriverFactory {
    provider: Arc<ProviderConfig>,
    state_ttl_seconds: u64,
    transport: Arc<dyn HttpTransport>,
}

impl CartaDriverFactory {
    pub fn new(config: CartaConfig) -> CartaResult<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.http_timeout_seconds)?);
        Self::with_transport(config, transport)
    }

    pub fn with_transport(
        config: CartaConfig,
        transport: Arc<dyn HttpTransport>,
    ) -> CartaResult<Self> {
        config.validate()?;
        Ok(Self {
            provider: Arc::new(config.provider),
            state_ttl_seconds: config.state_ttl_seconds,
            transport,
        })
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Build a driver for the current request with its state cookie loaded.
    pub async fn driver(&self, cookies: Arc<dyn StateCookieStore>) -> CartaResult<CartaDriver> {
        let mut driver = CartaDriver::new(
            self.provider.clone(),
            self.state_ttl_seconds,
            self.transport.clone(),
            cookies,
        )?;
        driver.load_state().await?;
        Ok(driver)
    }
}
