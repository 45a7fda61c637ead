//! User profile retrieval and normalization.

use crate::config::ProviderConfig;
use crate::error::{CartaError, CartaResult};
use crate::http::{ApiRequest, HttpTransport};
use crate::types::{AccessToken, EmailVerificationState, UserProfile};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

/// Hook that adjusts the outgoing profile request. It runs after the
/// fetcher's own configuration, so anything it sets wins.
pub type RequestCustomizer = dyn Fn(&mut ApiRequest) + Send + Sync;

/// Where the profile fields live in the response body.
///
/// The post-login call site receives `{"data": {...}}` while the
/// fetch-by-token call site reads the fields at the top level. Both shapes
/// are kept until Carta confirms which one `/auth/me` really returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileShape {
    Enveloped,
    Flat,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum UserId {
    Text(String),
    Number(serde_json::Number),
}

impl UserId {
    fn into_string(self) -> String {
        match self {
            UserId::Text(id) => id,
            UserId::Number(id) => id.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CartaUser {
    id: UserId,
    username: String,
    #[serde(default)]
    email: Option<String>,
}

pub struct UserProfileFetcher {
    config: Arc<ProviderConfig>,
    transport: Arc<dyn HttpTransport>,
}

impl UserProfileFetcher {
    pub fn new(config: Arc<ProviderConfig>, transport: Arc<dyn HttpTransport>) -> Self {
        Self { config, transport }
    }

    pub async fn fetch(
        &self,
        token: AccessToken,
        shape: ProfileShape,
        customizer: Option<&RequestCustomizer>,
    ) -> CartaResult<UserProfile> {
        let mut request = ApiRequest::get(self.config.user_info_url());
        request
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", token.token()));

        if let Some(customize) = customizer {
            customize(&mut request);
        }

        let response = self.transport.send(request).await?;

        if !response.is_success() {
            error!(status = response.status, "User info request failed: {}", response.body);
            return Err(CartaError::ProfileFetch(format!(
                "status {}: {}",
                response.status, response.body
            )));
        }

        let original: serde_json::Value = serde_json::from_str(&response.body)
            .map_err(|e| CartaError::ProfileFetch(format!("invalid user info response: {}", e)))?;

        let user = Self::parse_user(&original, shape)?;
        let profile = Self::normalize(user, token, original);

        debug!("Successfully retrieved user info for id: {}", profile.id);
        Ok(profile)
    }

    fn parse_user(original: &serde_json::Value, shape: ProfileShape) -> CartaResult<CartaUser> {
        let fields = match shape {
            ProfileShape::Enveloped => original.get("data").ok_or_else(|| {
                CartaError::ProfileFetch("response is missing the data envelope".to_string())
            })?,
            ProfileShape::Flat => original,
        };

        CartaUser::deserialize(fields)
            .map_err(|e| CartaError::ProfileFetch(format!("invalid user info fields: {}", e)))
    }

    fn normalize(user: CartaUser, token: AccessToken, original: serde_json::Value) -> UserProfile {
        UserProfile {
            id: user.id.into_string(),
            nickname: user.username.clone(),
            display_name: user.username,
            email: user.email,
            email_verification_state: EmailVerificationState::Unsupported,
            avatar_url: None,
            token,
            original,
        }
    }
}
