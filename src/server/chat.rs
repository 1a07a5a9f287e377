//! Single-turn chat. `/api/chat` answers in the OpenAI-style streaming chunk
//! format the frontend's chat SDK expects; the whole reply goes out as one
//! content chunk followed by a stop chunk and the `[DONE]` marker.

use std::convert::Infallible;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_stream::Stream;

use super::{generate_text, SharedState};
use crate::errors::{ApiError, ApiResult};
use crate::llm::GenerationOptions;
use crate::prompts;

pub const DONE_MARKER: &str = "[DONE]";
const CHUNK_OBJECT: &str = "chat.completion.chunk";
const SELF_TEST_PROMPT: &str = "Say hello and confirm you're working!";

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChunkChoice {
    index: u32,
    delta: Value,
    finish_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct ChatChunk<'a> {
    id: &'a str,
    object: &'static str,
    created: i64,
    model: &'a str,
    choices: Vec<ChunkChoice>,
}

/// Content of the most recent `user` message.
pub fn last_user_message(messages: &[ChatMessage]) -> ApiResult<&str> {
    if messages.is_empty() {
        return Err(ApiError::BadRequest("No messages provided".to_string()));
    }
    messages
        .iter()
        .rev()
        .find(|m| m.role == "user" && !m.content.trim().is_empty())
        .map(|m| m.content.as_str())
        .ok_or_else(|| ApiError::BadRequest("No user message found".to_string()))
}

fn chunk_event(id: &str, model: &str, delta: Value, finish_reason: Option<&'static str>) -> Event {
    let chunk = ChatChunk {
        id,
        object: CHUNK_OBJECT,
        created: Utc::now().timestamp(),
        model,
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    };
    let data = serde_json::to_string(&chunk).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}

/// The three frames of one reply: content, stop, done.
pub fn reply_events(model: &str, text: &str) -> Vec<Event> {
    let id = format!("chatcmpl-{}", uuid::Uuid::new_v4());
    vec![
        chunk_event(&id, model, json!({ "content": text }), None),
        chunk_event(&id, model, json!({}), Some("stop")),
        Event::default().data(DONE_MARKER),
    ]
}

pub async fn chat(
    State(state): State<SharedState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let Json(request) = request?;
    let message = last_user_message(&request.messages)?;
    info!(
        "Chat request with {} messages: {}",
        request.messages.len(),
        prompts::preview(message)
    );

    let reply = generate_text(state.llm.as_ref(), message, GenerationOptions::PRECISE).await?;
    let events = reply_events(&state.llm.model_name(), &reply);
    Ok(Sse::new(tokio_stream::iter(
        events.into_iter().map(Ok::<_, Infallible>),
    )))
}

pub async fn chat_simple(
    State(state): State<SharedState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(request) = request?;
    let message = last_user_message(&request.messages)?;
    let reply = generate_text(state.llm.as_ref(), message, GenerationOptions::PRECISE).await?;
    Ok(Json(json!({
        "response": reply,
        "status": "success",
    })))
}

/// Connectivity probe for the LLM. Always 200; the body says what happened.
pub async fn test(State(state): State<SharedState>) -> Json<Value> {
    match state
        .llm
        .generate(SELF_TEST_PROMPT, GenerationOptions::PRECISE)
        .await
    {
        Ok(text) => Json(json!({
            "status": "success",
            "response": text,
            "gemini_working": true,
        })),
        Err(e) if e.is_quota() => {
            warn!("LLM self-test hit quota: {}", e);
            Json(json!({
                "status": "quota_exceeded",
                "response": "LLM quota exceeded. Please try again later.",
                "gemini_working": false,
            }))
        }
        Err(e) => {
            warn!("LLM self-test failed: {}", e);
            Json(json!({
                "status": "error",
                "error": ApiError::llm(e).to_string(),
                "gemini_working": false,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn picks_the_latest_user_message() {
        let messages = vec![
            message("user", "first"),
            message("assistant", "answer"),
            message("user", "second"),
            message("assistant", "another"),
        ];
        assert_eq!(last_user_message(&messages).unwrap(), "second");
    }

    #[test]
    fn rejects_empty_and_user_less_conversations() {
        assert!(matches!(
            last_user_message(&[]),
            Err(ApiError::BadRequest(msg)) if msg == "No messages provided"
        ));
        assert!(matches!(
            last_user_message(&[message("system", "be nice")]),
            Err(ApiError::BadRequest(msg)) if msg == "No user message found"
        ));
    }

    #[test]
    fn reply_is_three_frames() {
        assert_eq!(reply_events("gemini-2.0-flash", "hello").len(), 3);
    }
}
