use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::error;
use serde_json::json;
use thiserror::Error;

/// Upstream messages echoed to callers are cut to this many characters.
pub const MAX_DETAIL_CHARS: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Errors raised by the Google REST clients (OAuth, userinfo, Gmail, Calendar).
#[derive(Debug, Error)]
pub enum GoogleApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Google API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Response format error: {0}")]
    FormatError(String),
}

impl GoogleApiError {
    /// True when the provider rejected the credentials themselves.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GoogleApiError::ApiError { status: 401, .. })
            || matches!(self, GoogleApiError::AuthError(_))
    }
}

pub type GoogleResult<T> = std::result::Result<T, GoogleApiError>;

/// Errors raised by the LLM client.
///
/// `Quota` is the one outcome handlers degrade on instead of surfacing.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM quota exceeded: {0}")]
    Quota(String),

    #[error("LLM API key is not configured")]
    NotConfigured,

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned no text: {0}")]
    EmptyResponse(String),
}

impl LlmError {
    pub fn is_quota(&self) -> bool {
        matches!(self, LlmError::Quota(_))
    }
}

/// Error returned from HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid authentication credentials: {0}")]
    Unauthorized(String),

    #[error("Error processing OAuth callback: {0}")]
    Exchange(String),

    #[error("Gmail API error: {0}")]
    Gmail(String),

    #[error("Calendar API error: {0}")]
    Calendar(String),

    #[error("LLM error: {0}")]
    Llm(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Configuration(_)
            | ApiError::Exchange(_)
            | ApiError::Gmail(_)
            | ApiError::Calendar(_)
            | ApiError::Llm(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable tag clients can switch on.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Configuration(_) => "configuration_error",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Exchange(_) => "token_exchange_error",
            ApiError::Gmail(_) => "gmail_api_error",
            ApiError::Calendar(_) => "calendar_api_error",
            ApiError::Llm(_) => "llm_error",
        }
    }

    pub fn gmail(err: GoogleApiError) -> Self {
        ApiError::Gmail(truncate_detail(&err.to_string()))
    }

    pub fn calendar(err: GoogleApiError) -> Self {
        ApiError::Calendar(truncate_detail(&err.to_string()))
    }

    pub fn llm(err: LlmError) -> Self {
        match err {
            LlmError::NotConfigured => ApiError::Configuration(err.to_string()),
            other => ApiError::Llm(truncate_detail(&other.to_string())),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::Configuration(err.to_string())
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<axum::extract::rejection::QueryRejection> for ApiError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query string: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed ({}): {}", self.kind(), self);
        }

        let body = Json(json!({
            "detail": self.to_string(),
            "kind": self.kind(),
        }));

        let mut response = (status, body).into_response();
        if matches!(self, ApiError::Unauthorized(_)) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Cuts `message` to [`MAX_DETAIL_CHARS`] characters, marking the cut with "...".
pub fn truncate_detail(message: &str) -> String {
    truncate_chars(message, MAX_DETAIL_CHARS)
}

pub fn truncate_chars(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        message.to_string()
    } else {
        format!("{}...", message.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        let long = "é".repeat(MAX_DETAIL_CHARS + 10);
        let cut = truncate_detail(&long);
        assert_eq!(cut.chars().count(), MAX_DETAIL_CHARS + 3);
        assert!(cut.ends_with("..."));

        assert_eq!(truncate_detail("short"), "short");
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            ApiError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Calendar("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ApiError::Calendar("x".into()).kind(), "calendar_api_error");
        assert_eq!(ApiError::Gmail("x".into()).kind(), "gmail_api_error");
    }

    #[test]
    fn unauthorized_carries_challenge_header() {
        let response = ApiError::Unauthorized("expired".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[test]
    fn missing_llm_key_is_a_configuration_error() {
        let err = ApiError::llm(LlmError::NotConfigured);
        assert_eq!(err.kind(), "configuration_error");

        let err = ApiError::llm(LlmError::Request("x".repeat(500)));
        assert_eq!(err.kind(), "llm_error");
        assert!(err.to_string().len() < 300);
    }

    #[test]
    fn google_unauthorized_detection() {
        assert!(GoogleApiError::ApiError {
            status: 401,
            message: "Invalid Credentials".into()
        }
        .is_unauthorized());
        assert!(!GoogleApiError::ApiError {
            status: 500,
            message: "backend".into()
        }
        .is_unauthorized());
        assert!(!GoogleApiError::NetworkError("reset".into()).is_unauthorized());
    }
}
