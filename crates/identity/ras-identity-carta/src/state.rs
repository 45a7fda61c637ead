//! State value handling across the authorization redirect.

use crate::error::{CartaError, CartaResult};
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use rand::{Rng, thread_rng};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Cookie holding the state value between redirect and callback.
pub const STATE_COOKIE_NAME: &str = "carta_oauth_state";

/// Short-lived cookie store supplied by the host. Values are assumed to be
/// signed by the host; the driver stores and reads back a single opaque string.
#[async_trait]
pub trait StateCookieStore: Send + Sync {
    /// Store a value that expires after `ttl_seconds`
    async fn set(&self, name: &str, value: &str, ttl_seconds: u64) -> CartaResult<()>;

    /// Read a value, `None` when absent or expired
    async fn get(&self, name: &str) -> CartaResult<Option<String>>;

    /// Remove a value
    async fn clear(&self, name: &str) -> CartaResult<()>;
}

struct StoredCookie {
    value: String,
    expires_at: DateTime<Utc>,
}

/// In-memory implementation of StateCookieStore
///
/// Holds the cookies of a single browser session. Suitable for tests and for
/// hosts that keep one store per session.
pub struct InMemoryCookieStore {
    cookies: Arc<RwLock<HashMap<String, StoredCookie>>>,
}

impl InMemoryCookieStore {
    pub fn new() -> Self {
        Self {
            cookies: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryCookieStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateCookieStore for InMemoryCookieStore {
    async fn set(&self, name: &str, value: &str, ttl_seconds: u64) -> CartaResult<()> {
        let expires_at = i64::try_from(ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                CartaError::StateStore(format!("TTL out of range: {}", ttl_seconds))
            })?;

        let mut cookies = self.cookies.write().await;
        cookies.insert(
            name.to_string(),
            StoredCookie {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get(&self, name: &str) -> CartaResult<Option<String>> {
        let cookies = self.cookies.read().await;
        Ok(cookies
            .get(name)
            .filter(|cookie| Utc::now() <= cookie.expires_at)
            .map(|cookie| cookie.value.clone()))
    }

    async fn clear(&self, name: &str) -> CartaResult<()> {
        let mut cookies = self.cookies.write().await;
        cookies.remove(name);
        Ok(())
    }
}

/// Decides whether the state returned by the provider is acceptable.
pub trait StateValidator: Send + Sync {
    fn matches(&self, expected: Option<&str>, returned: Option<&str>) -> bool;
}

/// Accepts every callback.
///
/// Carta does not echo the state parameter on its redirect, so there is
/// nothing to compare against. The state cookie is still issued and sent to
/// the token endpoint as `challengeVerifier`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStateValidator;

impl StateValidator for NoOpStateValidator {
    fn matches(&self, _expected: Option<&str>, _returned: Option<&str>) -> bool {
        true
    }
}

/// Requires the returned state to equal the stored cookie value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookieCompareValidator;

impl StateValidator for CookieCompareValidator {
    fn matches(&self, expected: Option<&str>, returned: Option<&str>) -> bool {
        match (expected, returned) {
            (Some(expected), Some(returned)) => !expected.is_empty() && expected == returned,
            _ => false,
        }
    }
}

/// Generate a new random state value (32 URL-safe characters)
pub fn generate_state() -> String {
    let mut rng = thread_rng();
    let bytes: Vec<u8> = (0..24).map(|_| rng.r#gen::<u8>()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Issues, persists and reads back the state value for one login attempt.
pub struct StateManager {
    store: Arc<dyn StateCookieStore>,
    validator: Arc<dyn StateValidator>,
    ttl_seconds: u64,
    loaded: Option<String>,
}

impl StateManager {
    pub fn new(
        store: Arc<dyn StateCookieStore>,
        validator: Arc<dyn StateValidator>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            validator,
            ttl_seconds,
            loaded: None,
        }
    }

    pub fn issue(&self) -> String {
        generate_state()
    }

    pub async fn persist(&self, value: &str) -> CartaResult<()> {
        self.store
            .set(STATE_COOKIE_NAME, value, self.ttl_seconds)
            .await
    }

    /// Read the persisted value once and clear the cookie so it cannot be
    /// replayed by a later request.
    pub async fn load(&mut self) -> CartaResult<()> {
        self.loaded = self.store.get(STATE_COOKIE_NAME).await?;
        self.store.clear(STATE_COOKIE_NAME).await?;
        debug!(found = self.loaded.is_some(), "Loaded state cookie");
        Ok(())
    }

    pub fn current_value(&self) -> Option<&str> {
        self.loaded.as_deref()
    }

    pub fn matches(&self, returned: Option<&str>) -> bool {
        self.validator.matches(self.current_value(), returned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(store: Arc<InMemoryCookieStore>, validator: Arc<dyn StateValidator>) -> StateManager {
        StateManager::new(store, validator, 600)
    }

    #[tokio::test]
    async fn test_in_memory_cookie_store() {
        let store = InMemoryCookieStore::new();

        store.set("name", "value", 300).await.unwrap();
        assert_eq!(store.get("name").await.unwrap(), Some("value".to_string()));

        store.clear("name").await.unwrap();
        assert_eq!(store.get("name").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let store = InMemoryCookieStore::new();

        let result = store.set("name", "value", 10_000_000_000_000).await;
        assert!(matches!(result, Err(CartaError::StateStore(_))));

        let result = store.set("name", "value", u64::MAX).await;
        assert!(matches!(result, Err(CartaError::StateStore(_))));

        assert_eq!(store.get("name").await.unwrap(), None);
    }

    #[test]
    fn test_expired_cookie_is_not_returned() {
        let store = InMemoryCookieStore::new();
        tokio_test::block_on(async {
            store.set("name", "value", 0).await.unwrap();
            {
                let mut cookies = store.cookies.write().await;
                if let Some(cookie) = cookies.get_mut("name") {
                    cookie.expires_at = Utc::now() - Duration::minutes(1);
                }
            }
            assert_eq!(store.get("name").await.unwrap(), None);
        });
    }

    #[test]
    fn test_generated_states_are_unique() {
        let state1 = generate_state();
        let state2 = generate_state();

        assert_ne!(state1, state2);
        assert_eq!(state1.len(), 32);
        assert!(
            state1
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn test_noop_validator_accepts_everything() {
        let validator = NoOpStateValidator;
        assert!(validator.matches(Some("issued"), Some("issued")));
        assert!(validator.matches(Some("issued"), Some("forged")));
        assert!(validator.matches(Some("issued"), None));
        assert!(validator.matches(None, None));
    }

    #[test]
    fn test_cookie_compare_validator() {
        let validator = CookieCompareValidator;
        assert!(validator.matches(Some("issued"), Some("issued")));
        assert!(!validator.matches(Some("issued"), Some("forged")));
        assert!(!validator.matches(Some("issued"), None));
        assert!(!validator.matches(None, Some("issued")));
        assert!(!validator.matches(Some(""), Some("")));
    }

    #[tokio::test]
    async fn test_persist_then_load_clears_cookie() {
        let store = Arc::new(InMemoryCookieStore::new());
        let redirect = manager(store.clone(), Arc::new(NoOpStateValidator));

        let state = redirect.issue();
        redirect.persist(&state).await.unwrap();

        let mut callback = manager(store.clone(), Arc::new(NoOpStateValidator));
        callback.load().await.unwrap();
        assert_eq!(callback.current_value(), Some(state.as_str()));
        assert_eq!(store.get(STATE_COOKIE_NAME).await.unwrap(), None);

        let mut replay = manager(store, Arc::new(NoOpStateValidator));
        replay.load().await.unwrap();
        assert_eq!(replay.current_value(), None);
    }

    #[tokio::test]
    async fn test_manager_matches_uses_validator() {
        let store = Arc::new(InMemoryCookieStore::new());
        store.set(STATE_COOKIE_NAME, "issued", 600).await.unwrap();

        let mut strict = manager(store.clone(), Arc::new(CookieCompareValidator));
        strict.load().await.unwrap();
        assert!(strict.matches(Some("issued")));
        assert!(!strict.matches(Some("other")));

        let lenient = manager(store, Arc::new(NoOpStateValidator));
        assert!(lenient.matches(None));
        assert!(lenient.matches(Some("other")));
    }
}
