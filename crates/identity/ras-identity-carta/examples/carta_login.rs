//! Example showing how to log users in with Carta from an axum server
//!
//! This example demonstrates:
//! 1. Loading the driver configuration from `carta.toml` and `CARTA__*` variables
//! 2. Redirecting the user to Carta
//! 3. Completing the login on the callback
//! 4. Fetching a profile for an existing token sent as `Authorization: Bearer ...`
//!
//! Run with:
//! CARTA__PROVIDER__CLIENT_ID=... CARTA__PROVIDER__CLIENT_SECRET=... \
//! CARTA__PROVIDER__CALLBACK_URL=http://localhost:3000/carta/callback \
//! cargo run -p ras-identity-carta --example carta_login

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use ras_identity_carta::{
    CallbackRequest, CartaConfig, CartaDriverFactory, CartaError, InMemoryCookieStore,
    StateCookieStore, UserProfile,
};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone)]
struct AppState {
    factory: CartaDriverFactory,
    // A real host keeps the state in a signed, per-browser cookie. One shared
    // store is enough for a single-user demo.
    cookies: Arc<dyn StateCookieStore>,
}

struct AppError(CartaError);

impl From<CartaError> for AppError {
    fn from(err: CartaError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CartaError::AccessDenied => StatusCode::FORBIDDEN,
            CartaError::MalformedCallback | CartaError::Provider(_) => StatusCode::BAD_REQUEST,
            CartaError::InvalidToken => StatusCode::UNAUTHORIZED,
            _ => StatusCode::BAD_GATEWAY,
        };
        let message = if self.0.is_access_denied() {
            "Login cancelled".to_string()
        } else {
            format!("Login failed: {}", self.0)
        };
        (status, message).into_response()
    }
}

async fn login(State(app): State<AppState>) -> Result<Redirect, AppError> {
    let driver = app.factory.driver(app.cookies.clone()).await?;
    let redirect = driver.initiate_redirect(&["profile", "email"]).await?;
    Ok(redirect.to_redirect()?)
}

async fn callback(State(app): State<AppState>, uri: Uri) -> Result<Json<UserProfile>, AppError> {
    let driver = app.factory.driver(app.cookies.clone()).await?;
    let profile = driver
        .complete_from_callback(&CallbackRequest::from_uri(&uri), None)
        .await?;

    info!("Logged in Carta user {}", profile.id);
    Ok(Json(profile))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn me(
    State(app): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserProfile>, AppError> {
    let token = bearer_token(&headers).ok_or(CartaError::InvalidToken)?;

    let driver = app.factory.driver(app.cookies.clone()).await?;
    let profile = driver.fetch_profile_by_token(token, None).await?;
    Ok(Json(profile))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = CartaConfig::load(Some(Path::new("carta.toml")))?;
    let state = AppState {
        factory: CartaDriverFactory::new(config)?,
        cookies: Arc::new(InMemoryCookieStore::new()),
    };

    let app = Router::new()
        .route("/carta/login", get(login))
        .route("/carta/callback", get(callback))
        .route("/carta/me", get(me))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    info!("Listening on http://127.0.0.1:3000/carta/login");
    axum::serve(listener, app).await?;

    Ok(())
}
