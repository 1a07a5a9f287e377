//! Hosted LLM access. Handlers only see the [`TextGenerator`] trait; the
//! production implementation talks to Gemini's `generateContent` endpoint.

use crate::auth::provider_message;
use crate::config::Config;
use crate::errors::LlmError;
use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Sampling settings for one generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl GenerationOptions {
    /// Short factual answers: summaries, replies, chat, event parsing.
    pub const PRECISE: Self = Self {
        temperature: 0.2,
        top_p: 0.95,
        top_k: 40,
        max_output_tokens: 2048,
    };

    /// Long structured documents and code reviews.
    pub const LONG_FORM: Self = Self {
        temperature: 0.3,
        top_p: 0.95,
        top_k: 40,
        max_output_tokens: 8192,
    };
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self::PRECISE
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a single prompt.
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String, LlmError>;

    /// Model identifier, echoed in chat stream chunks.
    fn model_name(&self) -> String;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationOptions,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// True when an upstream failure means "out of quota / slow down".
pub fn is_quota_failure(status: u16, body: &str) -> bool {
    let lowered = body.to_lowercase();
    status == 429 || lowered.contains("resource_exhausted") || lowered.contains("quota")
}

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.endpoints.gemini_base_url.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            api_key: config.gemini_api_key.clone(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<String, LlmError> {
        let api_key = self.api_key.as_deref().ok_or(LlmError::NotConfigured)?;

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
            generation_config: options,
        };

        debug!(
            "Calling {} with a {}-char prompt",
            self.model,
            prompt.chars().count()
        );

        let response = self
            .http
            .post(self.endpoint())
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Request(format!("Failed to read LLM response: {}", e)))?;

        if !status.is_success() {
            let message = provider_message(&body);
            if is_quota_failure(status.as_u16(), &body) {
                warn!("LLM quota exhausted ({}): {}", status, message);
                return Err(LlmError::Quota(message));
            }
            error!("LLM request failed ({}): {}", status, message);
            return Err(LlmError::Request(format!("{} {}", status.as_u16(), message)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Request(format!("Failed to parse LLM response: {}", e)))?;

        let text: String = parsed
            .candidates
            .iter()
            .filter_map(|c| c.content.as_ref())
            .flat_map(|content| content.parts.iter())
            .filter_map(|part| part.text.as_deref())
            .collect();

        if text.trim().is_empty() {
            let reason = parsed
                .candidates
                .first()
                .and_then(|c| c.finish_reason.clone())
                .or_else(|| parsed.prompt_feedback.map(|f| f.to_string()))
                .unwrap_or_else(|| "no candidates".to_string());
            return Err(LlmError::EmptyResponse(reason));
        }

        debug!("LLM returned {} chars", text.chars().count());
        Ok(text)
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
