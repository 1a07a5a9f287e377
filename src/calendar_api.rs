//! Google Calendar v3 client: upcoming events and event insertion on the
//! primary calendar.

use crate::auth::provider_message;
use crate::errors::{GoogleApiError, GoogleResult};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, error, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const PRIMARY_CALENDAR: &str = "primary";
pub const UPCOMING_LIMIT: u32 = 10;

/// `start` / `end` of an event. All-day events use `date`, timed ones `dateTime`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    /// `dateTime` when present, otherwise the all-day `date`.
    pub fn display(&self) -> String {
        self.date_time
            .clone()
            .or_else(|| self.date.clone())
            .unwrap_or_default()
    }
}

/// Request body for `events.insert`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventInsert {
    pub summary: String,
    pub location: String,
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
}

/// Event resource as returned by the API (only the fields we use).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

/// Flattened event as returned to the client by `GET /calendar/events`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventSummary {
    pub id: String,
    pub summary: String,
    pub start: String,
    pub end: String,
    pub location: String,
    pub description: String,
}

impl From<CalendarEvent> for EventSummary {
    fn from(event: CalendarEvent) -> Self {
        EventSummary {
            summary: event.summary.unwrap_or_else(|| "No Title".to_string()),
            start: event.start.display(),
            end: event.end.display(),
            location: event.location.unwrap_or_default(),
            description: event.description.unwrap_or_default(),
            id: event.id,
        }
    }
}

pub struct CalendarClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl CalendarClient {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(PRIMARY_CALENDAR)
        )
    }

    async fn read_body(response: reqwest::Response) -> GoogleResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GoogleApiError::NetworkError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!("Calendar API request failed ({}): {}", status, body);
            return Err(GoogleApiError::ApiError {
                status: status.as_u16(),
                message: provider_message(&body),
            });
        }
        Ok(body)
    }

    /// Upcoming single events on the primary calendar, ordered by start.
    pub async fn list_upcoming_events(
        &self,
        now: DateTime<Utc>,
        max_results: u32,
    ) -> GoogleResult<Vec<CalendarEvent>> {
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = max_results.to_string();
        debug!("Listing up to {} events after {}", max_results, time_min);

        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(&self.access_token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let list: EventListResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse event list: {}", e)))?;

        debug!("Fetched {} events", list.items.len());
        Ok(list.items)
    }

    /// Inserts `event` into the primary calendar and returns the stored resource.
    pub async fn insert_event(&self, event: &EventInsert) -> GoogleResult<CalendarEvent> {
        info!("Inserting calendar event '{}'", event.summary);

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(&self.access_token)
            .json(event)
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let created: CalendarEvent = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse created event: {}", e)))?;

        debug!("Created event {}", created.id);
        Ok(created)
    }
}
