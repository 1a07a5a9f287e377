use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{authenticate, require, SharedState};
use crate::calendar_api::{CalendarClient, EventSummary, EventTime, UPCOMING_LIMIT};
use crate::errors::{ApiError, ApiResult};
use crate::event_draft::{self, DraftSource};
use crate::llm::GenerationOptions;
use crate::prompts;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    #[serde(alias = "natural_language_request")]
    pub description: String,
}

/// Provider-confirmed event, as returned to the client.
#[derive(Debug, Serialize)]
pub struct CreatedEvent {
    pub id: String,
    #[serde(rename = "htmlLink")]
    pub html_link: Option<String>,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
}

#[derive(Debug, Serialize)]
pub struct CreateEventResponse {
    pub event: CreatedEvent,
    pub status: &'static str,
    pub message: String,
    pub draft_source: DraftSource,
}

pub async fn events(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let user = authenticate(&state, &headers).await?;
    let calendar = CalendarClient::new(
        state.http.clone(),
        &state.config.endpoints.calendar_base_url,
        &user.access_token,
    );

    let events: Vec<EventSummary> = calendar
        .list_upcoming_events(Utc::now(), UPCOMING_LIMIT)
        .await
        .map_err(ApiError::calendar)?
        .into_iter()
        .map(EventSummary::from)
        .collect();

    if events.is_empty() {
        return Ok(Json(json!({
            "events": [],
            "message": "No upcoming events found",
        })));
    }
    Ok(Json(json!({ "events": events })))
}

/// Free text → LLM → validated draft (or fallback) → `events.insert`.
///
/// Model failures never abort the request: a failed call is replaced by a
/// placeholder answer, and unusable output by the fallback draft. Only the
/// insert itself can fail.
pub async fn create_event(
    State(state): State<SharedState>,
    headers: HeaderMap,
    request: Result<Json<CreateEventRequest>, JsonRejection>,
) -> ApiResult<Json<CreateEventResponse>> {
    let Json(request) = request?;
    require("description", &request.description)?;
    let user = authenticate(&state, &headers).await?;

    let now = Utc::now().naive_utc();
    let prompt = event_draft::build_event_prompt(now, &request.description);
    let output = match state.llm.generate(&prompt, GenerationOptions::PRECISE).await {
        Ok(text) => text,
        Err(e) => {
            warn!("Event parsing call failed ({}), using placeholder answer", e);
            event_draft::placeholder_response(now.date(), &request.description)
        }
    };
    info!("Model answer for event request: {}", prompts::preview(&output));

    let draft = event_draft::draft_from_output(&output, now, &request.description);
    let calendar = CalendarClient::new(
        state.http.clone(),
        &state.config.endpoints.calendar_base_url,
        &user.access_token,
    );
    let created = calendar
        .insert_event(&draft.to_insert_payload())
        .await
        .map_err(ApiError::calendar)?;

    let summary = created.summary.unwrap_or_else(|| draft.summary.clone());
    let message = format!(
        "Event '{}' created for {} at {}",
        summary,
        draft.start_date,
        draft.start_time.format("%H:%M")
    );
    info!("{} ({:?} draft)", message, draft.source);

    Ok(Json(CreateEventResponse {
        event: CreatedEvent {
            id: created.id,
            html_link: created.html_link,
            summary,
            start: created.start,
            end: created.end,
        },
        status: "created",
        message,
        draft_source: draft.source,
    }))
}
