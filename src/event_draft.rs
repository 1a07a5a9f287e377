//! Free text → calendar event draft.
//!
//! The LLM's answer is untrusted input. Whatever it returns (prose, a fenced
//! block, truncated JSON, or nothing at all) this module produces a complete
//! [`EventDraft`] so the insert call never sees a half-built event.

use crate::calendar_api::{EventInsert, EventTime};
use crate::errors::truncate_chars;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time zone designation attached to every inserted event.
pub const EVENT_TIME_ZONE: &str = "UTC";

pub const FALLBACK_SUMMARY: &str = "New Event";
const PLACEHOLDER_SUMMARY: &str = "Team Meeting";
const FALLBACK_SUMMARY_CHARS: usize = 60;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

/// Where a draft's fields came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftSource {
    Llm,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventDraft {
    pub summary: String,
    pub start_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_date: NaiveDate,
    pub end_time: NaiveTime,
    pub location: String,
    pub description: String,
    pub source: DraftSource,
}

#[derive(Debug, Error, PartialEq)]
pub enum DraftError {
    #[error("no JSON object found in model output")]
    NoJsonObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("event ends before it starts")]
    EndBeforeStart,
}

#[derive(Debug, Deserialize)]
struct RawDraft {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Prompt asking the model for a single JSON object describing the event.
pub fn build_event_prompt(now: NaiveDateTime, request: &str) -> String {
    format!(
        r#"You are a scheduling assistant. The current date and time is {now} ({weekday}).

Parse this calendar event request into structured fields.
Request: "{request}"

Resolve relative dates such as "tomorrow" or "next Tuesday" against the current date,
and durations such as "for 1 hour" into an end time.

Return ONLY a JSON object with exactly these fields:
- summary: the title or subject of the event
- start_date: in YYYY-MM-DD format
- start_time: in HH:MM format (24-hour)
- end_date: in YYYY-MM-DD format (same as start_date if not specified)
- end_time: in HH:MM format (24-hour, after start_time; one hour after start if no duration is given)
- location: the event location, or an empty string
- description: any additional details, or an empty string

Return ONLY valid JSON without explanations or markdown formatting."#,
        now = now.format("%Y-%m-%d %H:%M"),
        weekday = now.format("%A"),
        request = request.replace('"', "'"),
    )
}

/// Stand-in model answer used when the LLM call itself fails.
pub fn placeholder_response(today: NaiveDate, request: &str) -> String {
    let date = today.format(DATE_FORMAT).to_string();
    serde_json::json!({
        "summary": PLACEHOLDER_SUMMARY,
        "start_date": date,
        "start_time": "14:00",
        "end_date": date,
        "end_time": "15:00",
        "location": "",
        "description": request,
    })
    .to_string()
}

/// Removes a surrounding markdown code fence (```json … ```), if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") on the opening line.
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Returns the first balanced `{…}` object in `text`, ignoring braces that
/// appear inside JSON strings.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn required(value: Option<String>, field: &'static str) -> Result<String, DraftError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(DraftError::MissingField(field))
}

fn parse_date(value: &str, field: &'static str) -> Result<NaiveDate, DraftError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| DraftError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_time(value: &str, field: &'static str) -> Result<NaiveTime, DraftError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .map_err(|_| DraftError::InvalidField {
            field,
            value: value.to_string(),
        })
}

/// Parses and validates model output into a draft.
pub fn parse_event_draft(output: &str) -> Result<EventDraft, DraftError> {
    let unfenced = strip_code_fence(output);
    let json = extract_json_object(unfenced).ok_or(DraftError::NoJsonObject)?;
    let raw: RawDraft =
        serde_json::from_str(json).map_err(|e| DraftError::InvalidJson(e.to_string()))?;

    let summary = required(raw.summary, "summary")?;
    let start_date = parse_date(&required(raw.start_date, "start_date")?, "start_date")?;
    let start_time = parse_time(&required(raw.start_time, "start_time")?, "start_time")?;
    let end_date = parse_date(&required(raw.end_date, "end_date")?, "end_date")?;
    let end_time = parse_time(&required(raw.end_time, "end_time")?, "end_time")?;

    if end_date.and_time(end_time) < start_date.and_time(start_time) {
        return Err(DraftError::EndBeforeStart);
    }

    Ok(EventDraft {
        summary,
        start_date,
        start_time,
        end_date,
        end_time,
        location: raw.location.unwrap_or_default().trim().to_string(),
        description: raw.description.unwrap_or_default().trim().to_string(),
        source: DraftSource::Llm,
    })
}

/// The next Tuesday strictly after `today`. A Tuesday or any later weekday
/// rolls into the following week.
pub fn next_tuesday(today: NaiveDate) -> NaiveDate {
    let today_index = today.weekday().num_days_from_monday() as i64;
    let tuesday_index = Weekday::Tue.num_days_from_monday() as i64;
    let mut days_ahead = tuesday_index - today_index;
    if days_ahead <= 0 {
        days_ahead += 7;
    }
    today + Duration::days(days_ahead)
}

/// Deterministic draft used when model output cannot be trusted: next
/// Tuesday, 14:00 for one hour, with the raw request as the description.
pub fn fallback_draft(now: NaiveDateTime, request: &str) -> EventDraft {
    let date = next_tuesday(now.date());
    let request = request.trim();
    let summary = if request.is_empty() {
        FALLBACK_SUMMARY.to_string()
    } else {
        truncate_chars(request, FALLBACK_SUMMARY_CHARS)
    };

    EventDraft {
        summary,
        start_date: date,
        start_time: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or_default(),
        end_date: date,
        end_time: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
        location: String::new(),
        description: request.to_string(),
        source: DraftSource::Fallback,
    }
}

/// Parses model output, falling back to [`fallback_draft`] on any failure.
pub fn draft_from_output(output: &str, now: NaiveDateTime, request: &str) -> EventDraft {
    match parse_event_draft(output) {
        Ok(draft) => {
            debug!("Parsed event draft '{}' from model output", draft.summary);
            draft
        }
        Err(e) => {
            warn!("Could not use model output ({}), using fallback draft", e);
            fallback_draft(now, request)
        }
    }
}

/// `<date>T<HH:MM:SS>` without offset; the zone travels separately.
pub fn format_date_time(date: NaiveDate, time: NaiveTime) -> String {
    format!("{}T{}", date.format(DATE_FORMAT), time.format("%H:%M:%S"))
}

impl EventDraft {
    pub fn start_date_time(&self) -> String {
        format_date_time(self.start_date, self.start_time)
    }

    pub fn end_date_time(&self) -> String {
        format_date_time(self.end_date, self.end_time)
    }

    /// Calendar API `events.insert` body for this draft.
    pub fn to_insert_payload(&self) -> EventInsert {
        EventInsert {
            summary: self.summary.clone(),
            location: self.location.clone(),
            description: self.description.clone(),
            start: EventTime {
                date_time: Some(self.start_date_time()),
                date: None,
                time_zone: Some(EVENT_TIME_ZONE.to_string()),
            },
            end: EventTime {
                date_time: Some(self.end_date_time()),
                date: None,
                time_zone: Some(EVENT_TIME_ZONE.to_string()),
            },
        }
    }
}
