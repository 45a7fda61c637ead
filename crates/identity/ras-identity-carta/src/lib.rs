//! OAuth2 authorization-code driver for the Carta identity provider.
//!
//! Carta speaks a non-standard dialect of the authorization-code grant: the
//! redirect takes `client_code`/`redirect_url`/`challenge`, the callback carries
//! `authorization_code`, and the token and profile responses are wrapped in a
//! `data` envelope. This crate hard-codes that mapping and exposes three
//! operations through [`CartaDriver`]: issue the redirect, complete the login
//! from the callback, and fetch a profile for an existing token.
//!
//! The HTTP client, the state cookie store and the request accessor are
//! collaborators supplied by the host through [`HttpTransport`],
//! [`StateCookieStore`] and [`CallbackInput`].

mod config;
mod driver;
mod error;
mod http;
mod redirect;
mod state;
mod token;
mod types;
mod user;


pub use crate::config::{
    CartaConfig, DEFAULT_ACCESS_TOKEN_URL, DEFAULT_AUTHORIZE_URL, DEFAULT_USER_INFO_URL,
    MAX_STATE_TTL_SECONDS, ProviderConfig,
};
pub use driver::{
    ACCESS_DENIED_ERROR, CODE_PARAM, CallbackInput, CallbackOutcome, CallbackRequest,
    CartaDriver, CartaDriverFactory, ERROR_PARAM,
};
pub use error::{CartaError, CartaResult};
pub use http::{ApiRequest, HttpMethod, HttpResponse, HttpTransport, ReqwestTransport};
pub use redirect::{AuthorizationRequestBuilder, RedirectRequest};
pub use state::{
    CookieCompareValidator, InMemoryCookieStore, NoOpStateValidator, STATE_COOKIE_NAME,
    StateCookieStore, StateManager, StateValidator, generate_state,
};
pub use token::TokenExchangeClient;
pub use types::{AccessToken, EmailVerificationState, TokenType, UserProfile};
pub use user::{ProfileShape, RequestCustomizer, UserProfileFetcher};
