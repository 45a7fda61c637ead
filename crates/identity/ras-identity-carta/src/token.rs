//! Authorization code exchange against the Carta token endpoint.

use crate::config::ProviderConfig;
use crate::error::{CartaError, CartaResult};
use crate::http::{ApiRequest, HttpTransport};
use crate::types::AccessToken;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Carta wraps the token payload in a `data` envelope and uses camelCase keys.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    data: ExchangeData,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeData {
    access_token: Option<String>,
    refresh_token: Option<String>,
}

pub struct TokenExchangeClient {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl TokenExchangeClient {
    pub fn new(config: Arc<ProviderConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    /// Exchange an authorization code for an access token.
    ///
    /// `state_cookie_value` is sent as `challengeVerifier`. The request is
    /// never retried: codes are single use.
    pub async fn exchange(
        &self,
        code: &str,
        state_cookie_value: Option<&str>,
    ) -> CartaResult<AccessToken> {
        let request = self.build_request(code, state_cookie_value);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            error!(status = response.status, "Token exchange failed: {}", response.body);
            return Err(CartaError::TokenExchange(format!(
                "status {}: {}",
                response.status, response.body
            )));
        }

        let token = Self::parse_response(&response.body)?;
        info!("Successfully exchanged code for tokens");
        Ok(token)
    }

    fn build_request(&self, code: &str, state_cookie_value: Option<&str>) -> ApiRequest {
        let mut request = ApiRequest::post(self.config.access_token_url());
        request
            .header("Accept", "application/json")
            .field("grant_type", "authorization_code")
            .field("code", code)
            .field("client_id", &self.config.client_id)
            .field("client_secret", &self.config.client_secret)
            .field("redirect_uri", &self.config.callback_url)
            .field("challengeVerifier", state_cookie_value.unwrap_or_default())
            .field("clientSecret", &self.config.client_secret);
        request
    }

    fn parse_response(body: &str) -> CartaResult<AccessToken> {
        let parsed: ExchangeResponse = serde_json::from_str(body)
            .map_err(|e| CartaError::TokenExchange(format!("invalid token response: {}", e)))?;

        let access_token = parsed
            .data
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                CartaError::TokenExchange("response is missing data.accessToken".to_string())
            })?;

        Ok(AccessToken::bearer(access_token)?.with_refresh_token(parsed.data.refresh_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenType;

    #[test]
    fn test_parse_enveloped_response() {
        let token = TokenExchangeClient::parse_response(
            r#"{"data": {"accessToken": "T1", "refreshToken": "R1"}}"#,
        )
        .unwrap();

        assert_eq!(token.token(), "T1");
        assert_eq!(token.token_type(), TokenType::Bearer);
        assert_eq!(token.refresh_token(), Some("R1"));
    }

    #[test]
    fn test_refresh_token_is_optional() {
        let token =
            TokenExchangeClient::parse_response(r#"{"data": {"accessToken": "T1"}}"#).unwrap();
        assert_eq!(token.refresh_token(), None);
    }

    #[test]
    fn test_malformed_responses_are_rejected() {
        for body in [
            r#"{"data": {"refreshToken": "R1"}}"#,
            r#"{"data": {"accessToken": ""}}"#,
            r#"{"data": {"accessToken": 42}}"#,
            r#"{"access_token": "T1", "refresh_token": "R1"}"#,
            "not json",
        ] {
            let result = TokenExchangeClient::parse_response(body);
            assert!(
                matches!(result, Err(CartaError::TokenExchange(_))),
                "expected TokenExchange error for {body}"
            );
        }
    }

    #[test]
    fn test_request_shape() {
        let config = Arc::new(ProviderConfig::new(
            "client",
            "secret",
            "http://localhost:3000/carta/callback",
        ));
        let client =
            TokenExchangeClient::new(config, Arc::new(crate::tests::test_support::NoTransport));

        let request = client.build_request("abc", Some("state-value"));
        assert_eq!(request.url(), crate::config::DEFAULT_ACCESS_TOKEN_URL);
        assert_eq!(request.field_value("code"), Some("abc"));
        assert_eq!(request.field_value("challengeVerifier"), Some("state-value"));
        assert_eq!(request.field_value("clientSecret"), Some("secret"));
        assert_eq!(request.field_value("client_id"), Some("client"));
        assert_eq!(
            request.field_value("redirect_uri"),
            Some("http://localhost:3000/carta/callback")
        );

        let request = client.build_request("abc", None);
        assert_eq!(request.field_value("challengeVerifier"), Some(""));
    }
}
