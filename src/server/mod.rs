//! HTTP surface: axum router, shared state, CORS and the bearer gate used by
//! every mail and calendar handler.

use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use reqwest::Client;
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};

use crate::auth::{AuthenticatedUser, BearerValidator, OAuthClient};
use crate::code_store::{CodeStore, MemoryCodeStore};
use crate::config::Config;
use crate::errors::{ApiError, ApiResult};
use crate::llm::{GeminiClient, GenerationOptions, TextGenerator};

pub mod auth;
pub mod calendar;
pub mod chat;
pub mod code;
pub mod docs;
pub mod email;

/// Optional header carrying the caller's refresh token.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Shown in place of generated text when the LLM is out of quota.
pub const QUOTA_MESSAGE: &str =
    "The AI service is currently experiencing high usage. Please try again in a few minutes.";

/// State shared by all handlers.
pub struct AppState {
    pub config: Config,
    pub http: Client,
    pub oauth: OAuthClient,
    pub validator: BearerValidator,
    pub llm: Arc<dyn TextGenerator>,
    pub codes: Arc<dyn CodeStore>,
}

impl AppState {
    /// Production wiring: Gemini for text, in-memory code store.
    pub fn new(config: Config) -> Self {
        let http = Client::new();
        let llm: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(http.clone(), &config));
        Self::build(config, http, llm, Arc::new(MemoryCodeStore::new()))
    }

    /// Wiring with an injected generator and code store.
    pub fn with_parts(
        config: Config,
        llm: Arc<dyn TextGenerator>,
        codes: Arc<dyn CodeStore>,
    ) -> Self {
        Self::build(config, Client::new(), llm, codes)
    }

    fn build(
        config: Config,
        http: Client,
        llm: Arc<dyn TextGenerator>,
        codes: Arc<dyn CodeStore>,
    ) -> Self {
        let oauth = OAuthClient::new(http.clone(), &config);
        let validator = BearerValidator::new(http.clone(), oauth.clone());
        Self {
            config,
            http,
            oauth,
            validator,
            llm,
            codes,
        }
    }
}

pub type SharedState = Arc<AppState>;

/// Resolves the caller from `Authorization` (and `X-Refresh-Token` if sent).
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> ApiResult<AuthenticatedUser> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;
    let refresh = headers
        .get(REFRESH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    state.validator.resolve(bearer, refresh).await
}

/// One LLM call. Quota exhaustion degrades to [`QUOTA_MESSAGE`]; anything
/// else is surfaced.
pub(crate) async fn generate_text(
    llm: &dyn TextGenerator,
    prompt: &str,
    options: GenerationOptions,
) -> ApiResult<String> {
    match llm.generate(prompt, options).await {
        Ok(text) => Ok(text),
        Err(e) if e.is_quota() => {
            warn!("LLM quota exhausted, returning placeholder: {}", e);
            Ok(QUOTA_MESSAGE.to_string())
        }
        Err(e) => Err(ApiError::llm(e)),
    }
}

/// `{content, <legacy_key>}`: older clients read the second key.
pub(crate) fn generated(legacy_key: &str, text: String) -> Json<Value> {
    let mut body = serde_json::Map::new();
    body.insert(legacy_key.to_string(), Value::String(text.clone()));
    body.insert("content".to_string(), Value::String(text));
    Json(Value::Object(body))
}

/// Rejects blank required string fields before any external call.
pub(crate) fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        Err(ApiError::BadRequest(format!("Field '{}' is required", field)))
    } else {
        Ok(())
    }
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(REFRESH_TOKEN_HEADER),
        ]))
        .allow_credentials(true)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "PA Agent API is running",
    }))
}

pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(health))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/verify", get(auth::verify))
        .route("/auth/test-auth", get(auth::test_auth))
        .route("/auth/logout", post(auth::logout))
        .route("/email/unread", get(email::unread))
        .route("/email/draft-reply", post(email::draft_reply))
        .route("/email/send", post(email::send))
        .route("/calendar/events", get(calendar::events))
        .route("/calendar/create-event", post(calendar::create_event))
        .route("/docs/project-plan", post(docs::project_plan))
        .route("/docs/report-template", post(docs::report_template))
        .route("/docs/presentation-outline", post(docs::presentation_outline))
        .route("/code/review", post(code::review))
        .route("/code/suggest-refactoring", post(code::suggest_refactoring))
        .route("/code/explain", post(code::explain))
        .route("/api/chat", post(chat::chat))
        .route("/api/chat-simple", post(chat::chat_simple))
        .route("/api/test", get(chat::test))
        .layer(cors)
        .with_state(state)
}

/// Binds `config.bind_address` and serves until the process exits.
pub async fn serve(config: Config) -> std::io::Result<()> {
    let bind_address = config.bind_address.clone();
    let state = Arc::new(AppState::new(config));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("PA Agent API listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
