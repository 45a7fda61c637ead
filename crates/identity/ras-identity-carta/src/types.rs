//! Carta protocol types.

use crate::error::{CartaError, CartaResult};
use serde::{Deserialize, Serialize};

/// Only bearer tokens are issued by Carta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Bearer,
}

/// Access token returned by the exchange endpoint, or supplied by the caller
/// for the fetch-by-token path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAccessToken")]
pub struct AccessToken {
    token: String,
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct RawAccessToken {
    token: String,
    #[serde(rename = "type")]
    token_type: TokenType,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TryFrom<RawAccessToken> for AccessToken {
    type Error = CartaError;

    fn try_from(raw: RawAccessToken) -> CartaResult<Self> {
        let token = Self::bearer(raw.token)?.with_refresh_token(raw.refresh_token);
        Ok(Self {
            token_type: raw.token_type,
            ..token
        })
    }
}

impl AccessToken {
    pub fn bearer(token: impl Into<String>) -> CartaResult<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(CartaError::InvalidToken);
        }
        Ok(Self {
            token,
            token_type: TokenType::Bearer,
            refresh_token: None,
        })
    }

    pub(crate) fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    /// Captured from the exchange response. The driver never renews tokens.
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }
}

/// Carta never reports whether an email address was verified, so profiles
/// always carry `Unsupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailVerificationState {
    Verified,
    Unverified,
    Unsupported,
}

/// Provider-agnostic user record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub nickname: String,
    pub display_name: String,
    pub email: Option<String>,
    pub email_verification_state: EmailVerificationState,
    pub avatar_url: Option<String>,
    pub token: AccessToken,
    /// Response body exactly as the provider returned it
    pub original: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token() {
        let token = AccessToken::bearer("T1").unwrap();
        assert_eq!(token.token(), "T1");
        assert_eq!(token.token_type(), TokenType::Bearer);
        assert_eq!(token.refresh_token(), None);
    }

    #[test]
    fn test_empty_token_is_rejected() {
        assert!(matches!(
            AccessToken::bearer(""),
            Err(CartaError::InvalidToken)
        ));
    }

    #[test]
    fn test_token_serializes_type_tag() {
        let token = AccessToken::bearer("T1")
            .unwrap()
            .with_refresh_token(Some("R1".to_string()));
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"token": "T1", "type": "bearer", "refresh_token": "R1"})
        );
    }

    #[test]
    fn test_deserialize_rejects_empty_token() {
        let result = serde_json::from_str::<AccessToken>(r#"{"token":"","type":"bearer"}"#);
        assert!(result.is_err());

        let token: AccessToken =
            serde_json::from_str(r#"{"token":"T1","type":"bearer","refresh_token":"R1"}"#)
                .unwrap();
        assert_eq!(token.token(), "T1");
        assert_eq!(token.refresh_token(), Some("R1"));
    }

    #[test]
    fn test_profile_deserialize_rejects_empty_token() {
        let json = serde_json::json!({
            "id": "42",
            "nickname": "ada",
            "display_name": "ada",
            "email": null,
            "email_verification_state": "unsupported",
            "avatar_url": null,
            "token": {"token": "", "type": "bearer"},
            "original": {}
        });
        assert!(serde_json::from_value::<UserProfile>(json).is_err());
    }

    #[test]
    fn test_email_verification_state_serialization() {
        let json = serde_json::to_string(&EmailVerificationState::Unsupported).unwrap();
        assert_eq!(json, "\"unsupported\"");
    }
}
