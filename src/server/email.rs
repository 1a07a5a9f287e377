use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{authenticate, generate_text, require, SharedState};
use crate::errors::{ApiError, ApiResult};
use crate::gmail_api::{GmailClient, OutgoingEmail};
use crate::llm::GenerationOptions;
use crate::prompts;

/// Unread messages summarized per request.
pub const UNREAD_LIMIT: u32 = 5;

#[derive(Debug, Serialize)]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub summary: String,
}

fn default_tone() -> String {
    "professional".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DraftReplyRequest {
    pub message_id: String,
    #[serde(default = "default_tone")]
    pub tone: String,
}

#[derive(Debug, Serialize)]
pub struct DraftReplyResponse {
    pub reply: String,
    pub subject: String,
    pub to: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub in_reply_to: Option<String>,
    #[serde(default)]
    pub references: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
}

pub async fn unread(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    let gmail = GmailClient::new(
        state.http.clone(),
        &state.config.endpoints.gmail_base_url,
        &user.access_token,
    );

    let refs = gmail.list_unread(UNREAD_LIMIT).await.map_err(ApiError::gmail)?;
    if refs.is_empty() {
        return Ok(Json(json!({
            "emails": [],
            "message": "No unread emails found",
        })));
    }

    let mut emails = Vec::with_capacity(refs.len());
    for message_ref in refs.iter().take(UNREAD_LIMIT as usize) {
        let message = gmail
            .get_message(&message_ref.id)
            .await
            .map_err(ApiError::gmail)?;

        let prompt = prompts::email_summary(&message.from, &message.subject, &message.body);
        let summary =
            generate_text(state.llm.as_ref(), &prompt, GenerationOptions::PRECISE).await?;

        emails.push(EmailSummary {
            id: message.id,
            sender: message.from,
            subject: message.subject,
            summary,
        });
    }

    info!("Summarized {} unread emails for {}", emails.len(), user.identity.email);
    Ok(Json(json!({ "emails": emails })))
}

pub async fn draft_reply(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Result<Json<DraftReplyRequest>, JsonRejection>,
) -> ApiResult<Json<DraftReplyResponse>> {
    let Json(request) = request?;
    require("message_id", &request.message_id)?;
    let user = authenticate(&state, &headers).await?;

    let gmail = GmailClient::new(
        state.http.clone(),
        &state.config.endpoints.gmail_base_url,
        &user.access_token,
    );
    let original = gmail
        .get_message(&request.message_id)
        .await
        .map_err(ApiError::gmail)?;

    debug!("Drafting {} reply to {}", request.tone, original.id);
    let prompt = prompts::email_reply(&request.tone, &original.from, &original.subject, &original.body);
    let reply = generate_text(state.llm.as_ref(), &prompt, GenerationOptions::PRECISE).await?;

    Ok(Json(DraftReplyResponse {
        reply,
        subject: prompts::reply_subject(&original.subject),
        to: original.from,
        references: prompts::reply_references(
            original.references.as_deref(),
            original.message_id_header.as_deref(),
        ),
        in_reply_to: original.message_id_header,
        thread_id: original.thread_id,
    }))
}

pub async fn send(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    require("to", &request.to)?;
    require("subject", &request.subject)?;
    let user = authenticate(&state, &headers).await?;

    let gmail = GmailClient::new(
        state.http.clone(),
        &state.config.endpoints.gmail_base_url,
        &user.access_token,
    );
    let email = OutgoingEmail {
        to: request.to,
        subject: request.subject,
        body: request.body,
        in_reply_to: request.in_reply_to,
        references: request.references,
        thread_id: request.thread_id,
    };

    let message_id = gmail.send_message(&email).await.map_err(ApiError::gmail)?;
    Ok(Json(json!({
        "message_id": message_id,
        "status": "sent",
    })))
}
