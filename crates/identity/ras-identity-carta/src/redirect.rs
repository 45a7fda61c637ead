//! Authorization redirect construction.

use crate::config::ProviderConfig;
use crate::error::CartaResult;
use axum::response::Redirect;
use std::sync::Arc;
use url::Url;

pub const CLIENT_CODE_PARAM: &str = "client_code";
pub const REDIRECT_URL_PARAM: &str = "redirect_url";
pub const STATE_PARAM: &str = "challenge";
pub const SCOPE_PARAM: &str = "scope";
const SCOPE_SEPARATOR: &str = " ";

/// Redirect target: a base authorize URL, its query parameters and the
/// requested scopes.
#[derive(Debug, Clone)]
pub struct RedirectRequest {
    base_url: String,
    params: Vec<(String, String)>,
    scopes: Vec<String>,
}

impl RedirectRequest {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            params: Vec::new(),
            scopes: Vec::new(),
        }
    }

    /// Set a query parameter, replacing any previous value.
    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn clear_param(&mut self, name: &str) -> &mut Self {
        self.params.retain(|(existing, _)| existing != name);
        self
    }

    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replace the requested scopes.
    pub fn scopes<S: AsRef<str>>(&mut self, scopes: &[S]) -> &mut Self {
        self.scopes.clear();
        self.merge_scopes(scopes)
    }

    /// Add scopes to the ones already requested.
    pub fn merge_scopes<S: AsRef<str>>(&mut self, scopes: &[S]) -> &mut Self {
        for scope in scopes {
            let scope = scope.as_ref();
            if !scope.is_empty() && !self.scopes.iter().any(|s| s == scope) {
                self.scopes.push(scope.to_string());
            }
        }
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn requested_scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Final URL including every parameter and the space separated scopes.
    pub fn url(&self) -> CartaResult<Url> {
        let mut url = Url::parse(&self.base_url)?;
        {
            let mut query = url.query_pairs_mut();
            for (name, value) in &self.params {
                query.append_pair(name, value);
            }
            if !self.scopes.is_empty() {
                query.append_pair(SCOPE_PARAM, &self.scopes.join(SCOPE_SEPARATOR));
            }
        }
        Ok(url)
    }

    /// 303 redirect response for axum hosts.
    pub fn to_redirect(&self) -> CartaResult<Redirect> {
        Ok(Redirect::to(self.url()?.as_str()))
    }
}

/// Builds the Carta authorization redirect.
///
/// Carta expects `client_code` and `redirect_url` where the standard protocol
/// uses `client_id` and `redirect_uri`, and reads the state from `challenge`.
pub struct AuthorizationRequestBuilder {
    config: Arc<ProviderConfig>,
}

impl AuthorizationRequestBuilder {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self { config }
    }

    pub fn build<S: AsRef<str>>(&self, state: &str, scopes: &[S]) -> RedirectRequest {
        let mut request = RedirectRequest::new(self.config.authorize_url());
        request
            .param("client_id", &self.config.client_id)
            .param("redirect_uri", &self.config.callback_url)
            .param("response_type", "code")
            .param(STATE_PARAM, state)
            .scopes(scopes);

        Self::configure(&mut request);
        request
    }

    fn configure(request: &mut RedirectRequest) {
        let client_id = request.get_param("client_id").map(str::to_string);
        let redirect_uri = request.get_param("redirect_uri").map(str::to_string);
        request.clear_param("client_id").clear_param("redirect_uri");

        if let Some(client_id) = client_id {
            request.param(CLIENT_CODE_PARAM, client_id);
        }
        if let Some(redirect_uri) = redirect_uri {
            request.param(REDIRECT_URL_PARAM, redirect_uri);
        }
    }
}
