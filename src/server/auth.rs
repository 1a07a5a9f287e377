use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{authenticate, SharedState};
use crate::auth::CallbackResponse;
use crate::errors::ApiResult;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    /// Granted scopes as echoed by the provider. Informational only.
    #[serde(default)]
    pub scope: Option<String>,
}

pub async fn login(State(state): State<SharedState>) -> ApiResult<Json<Value>> {
    let auth_url = state.oauth.build_login_url()?;
    info!("Issued consent URL");
    Ok(Json(json!({ "auth_url": auth_url })))
}

pub async fn callback(
    State(state): State<SharedState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> ApiResult<Json<CallbackResponse>> {
    let Query(query) = query?;
    if let Some(scope) = &query.scope {
        debug!("Callback reports granted scopes: {}", scope);
    }
    let code = query.code.unwrap_or_default();
    let response = state.oauth.handle_callback(state.codes.as_ref(), &code).await?;
    Ok(Json(response))
}

pub async fn verify(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(json!({
        "status": "success",
        "user_email": user.identity.email,
        "user_name": user.identity.name,
        "message": "Authentication successful",
    })))
}

/// Older frontends call this instead of `verify`.
pub async fn test_auth(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    Ok(Json(json!({
        "status": "success",
        "user_email": user.identity.email,
        "user_name": user.identity.name,
        "message": "Authentication successful",
        "token_length": user.access_token.chars().count(),
    })))
}

/// Tokens live on the client, so there is nothing to revoke here.
pub async fn logout() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "Logged out successfully",
    }))
}
