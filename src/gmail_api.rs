//! Gmail v1 REST client: unread listing, message retrieval and sending.

use crate::auth::provider_message;
use crate::errors::{GoogleApiError, GoogleResult};
use log::{debug, error, info};
use reqwest::Client;
use serde::Deserialize;

pub const UNREAD_QUERY: &str = "is:unread";

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<MessagePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    id: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    payload: MessagePart,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub id: String,
    pub thread_id: Option<String>,
    pub subject: String,
    pub from: String,
    pub message_id_header: Option<String>,
    pub references: Option<String>,
    pub snippet: String,
    pub body: String,
}

impl EmailMessage {
    fn from_raw(message: RawMessage) -> Self {
        debug!("Converting Gmail message {} to EmailMessage", message.id);

        let mut subject = None;
        let mut from = None;
        let mut message_id_header = None;
        let mut references = None;

        for header in &message.payload.headers {
            match header.name.to_ascii_lowercase().as_str() {
                "subject" => subject = Some(header.value.clone()),
                "from" => from = Some(header.value.clone()),
                "message-id" => message_id_header = Some(header.value.clone()),
                "references" => references = Some(header.value.clone()),
                _ => {} // Ignore other headers
            }
        }

        let body = extract_plain_text(&message.payload);

        EmailMessage {
            id: message.id,
            thread_id: message.thread_id,
            subject: subject.unwrap_or_else(|| "No Subject".to_string()),
            from: from.unwrap_or_else(|| "Unknown Sender".to_string()),
            message_id_header,
            references,
            snippet: message.snippet,
            body,
        }
    }
}

/// Decodes Gmail's URL-safe base64 body data, padded or not.
pub fn decode_body(data: &str) -> Option<String> {
    let trimmed = data.trim().trim_end_matches('=');
    let bytes = base64::decode_config(trimmed, base64::URL_SAFE_NO_PAD).ok()?;
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Concatenates every `text/plain` part; single-part messages use the top-level body.
fn extract_plain_text(payload: &MessagePart) -> String {
    if payload.parts.is_empty() {
        return payload
            .body
            .data
            .as_deref()
            .and_then(decode_body)
            .unwrap_or_default();
    }

    let mut text = String::new();
    collect_plain_parts(&payload.parts, &mut text);
    text
}

fn collect_plain_parts(parts: &[MessagePart], out: &mut String) {
    for part in parts {
        if part.mime_type == "text/plain" {
            if let Some(decoded) = part.body.data.as_deref().and_then(decode_body) {
                out.push_str(&decoded);
            }
        } else if !part.parts.is_empty() {
            // multipart/alternative inside multipart/mixed
            collect_plain_parts(&part.parts, out);
        }
    }
}

/// Outgoing plain-text message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,
    pub thread_id: Option<String>,
}

fn header_value(value: &str) -> String {
    value.replace(['\r', '\n'], " ").trim().to_string()
}

impl OutgoingEmail {
    /// RFC 2822 rendering. Header values have CR/LF removed so caller input
    /// cannot inject extra headers.
    pub fn to_mime(&self) -> String {
        let mut mime = format!(
            "To: {}\r\nSubject: {}\r\n",
            header_value(&self.to),
            header_value(&self.subject)
        );
        if let Some(in_reply_to) = self.in_reply_to.as_deref().filter(|v| !v.trim().is_empty()) {
            mime.push_str(&format!("In-Reply-To: {}\r\n", header_value(in_reply_to)));
        }
        if let Some(references) = self.references.as_deref().filter(|v| !v.trim().is_empty()) {
            mime.push_str(&format!("References: {}\r\n", header_value(references)));
        }
        mime.push_str("MIME-Version: 1.0\r\n");
        mime.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
        mime.push_str("\r\n");
        mime.push_str(&self.body);
        mime
    }

    /// URL-safe base64 of the MIME text, as the `raw` field expects.
    pub fn to_raw(&self) -> String {
        base64::encode_config(self.to_mime().as_bytes(), base64::URL_SAFE)
    }
}

pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        }
    }

    async fn read_body(response: reqwest::Response) -> GoogleResult<String> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GoogleApiError::NetworkError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            error!("Gmail API request failed ({}): {}", status, body);
            return Err(GoogleApiError::ApiError {
                status: status.as_u16(),
                message: provider_message(&body),
            });
        }
        Ok(body)
    }

    /// Lists message references matching `query`.
    pub async fn list_messages(&self, query: &str, max_results: u32) -> GoogleResult<Vec<MessageRef>> {
        debug!("Listing messages with query={:?}, max_results={}", query, max_results);
        let max_results = max_results.to_string();

        let response = self
            .http
            .get(format!("{}/users/me/messages", self.base_url))
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("maxResults", max_results.as_str())])
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let list: MessageListResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse message list: {}", e)))?;

        info!("Found {} message references", list.messages.len());
        Ok(list.messages)
    }

    pub async fn list_unread(&self, max_results: u32) -> GoogleResult<Vec<MessageRef>> {
        self.list_messages(UNREAD_QUERY, max_results).await
    }

    /// Fetches one message in `full` format.
    pub async fn get_message(&self, message_id: &str) -> GoogleResult<EmailMessage> {
        debug!("Getting message with ID: {}", message_id);

        let response = self
            .http
            .get(format!(
                "{}/users/me/messages/{}",
                self.base_url,
                urlencoding::encode(message_id)
            ))
            .bearer_auth(&self.access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let raw: RawMessage = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse message: {}", e)))?;

        Ok(EmailMessage::from_raw(raw))
    }

    /// Sends `email` and returns the new message id.
    pub async fn send_message(&self, email: &OutgoingEmail) -> GoogleResult<String> {
        info!("Sending email to {}", header_value(&email.to));

        let mut payload = serde_json::json!({ "raw": email.to_raw() });
        if let Some(thread_id) = email.thread_id.as_deref().filter(|t| !t.is_empty()) {
            payload["threadId"] = serde_json::Value::String(thread_id.to_string());
        }

        let response = self
            .http
            .post(format!("{}/users/me/messages/send", self.base_url))
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let body = Self::read_body(response).await?;
        let sent: SendResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse send response: {}", e)))?;

        debug!("Sent message {}", sent.id);
        Ok(sent.id)
    }
}
