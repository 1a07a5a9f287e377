//! Google OAuth2: consent URL, authorization-code exchange with replay
//! protection, token refresh and bearer-token validation.

use crate::code_store::{CodeClaim, CodeStore};
use crate::config::{ClientCredentials, Config};
use crate::errors::{
    truncate_detail, ApiError, ApiResult, ConfigError, GoogleApiError, GoogleResult,
};
use log::{debug, error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const STATE_LENGTH: usize = 30;

// Token response for OAuth2
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Who the bearer of a token is, as reported by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// Credential bundle for one request. Never persisted.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

/// Body returned by `GET /auth/callback`. Cached per authorization code so a
/// replayed callback answers with exactly the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackResponse {
    pub status: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub user_info: Option<Identity>,
}

impl CallbackResponse {
    fn new(credentials: Credentials, user_info: Option<Identity>) -> Self {
        Self {
            status: "success".to_string(),
            access_token: credentials.access_token,
            refresh_token: credentials.refresh_token,
            token_uri: credentials.token_uri,
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            scopes: credentials.scopes,
            user_info,
        }
    }
}

/// Shortens a secret for logging. Never log the full value.
pub(crate) fn redact(secret: &str) -> String {
    if secret.chars().count() > 10 {
        let head: String = secret.chars().take(4).collect();
        let tail: String = secret
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("{}...{}", head, tail)
    } else {
        "<short-secret>".to_string()
    }
}

/// Pulls the human-readable message out of a Google error body.
pub(crate) fn provider_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct OAuthErrorBody {
        error: serde_json::Value,
        #[serde(default)]
        error_description: Option<String>,
    }

    if let Ok(parsed) = serde_json::from_str::<OAuthErrorBody>(body) {
        if let Some(description) = parsed.error_description {
            return description;
        }
        // REST APIs nest the message: {"error": {"code": 401, "message": "..."}}
        if let Some(message) = parsed.error.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        if let Some(code) = parsed.error.as_str() {
            return code.to_string();
        }
    }
    if body.trim().is_empty() {
        "<no response body>".to_string()
    } else {
        truncate_detail(body.trim())
    }
}

/// Strips up to two leading `Bearer ` prefixes. Returns `None` if nothing is left.
pub fn normalize_bearer(value: &str) -> Option<&str> {
    let mut token = value.trim();
    for _ in 0..2 {
        match strip_prefix_ignore_case(token, "bearer ") {
            Some(rest) => token = rest.trim_start(),
            None => break,
        }
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    if value.len() >= prefix.len()
        && value.is_char_boundary(prefix.len())
        && value[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

/// Calls the userinfo ("who am I") endpoint with `access_token`.
pub async fn fetch_identity(
    client: &Client,
    userinfo_url: &str,
    access_token: &str,
) -> GoogleResult<Identity> {
    debug!("Resolving identity for token {}", redact(access_token));

    let response = client
        .get(userinfo_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| GoogleApiError::NetworkError(format!("Failed to read userinfo: {}", e)))?;

    if !status.is_success() {
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: provider_message(&body),
        });
    }

    serde_json::from_str::<Identity>(&body)
        .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse userinfo: {}", e)))
}

/// OAuth client bound to the server's static configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    auth_url: String,
    token_url: String,
    userinfo_url: String,
    redirect_uri: String,
    scopes: Vec<String>,
    config: Config,
}

impl OAuthClient {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            auth_url: config.endpoints.auth_url.clone(),
            token_url: config.endpoints.token_url.clone(),
            userinfo_url: config.endpoints.userinfo_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            config: config.clone(),
        }
    }

    fn credentials(&self) -> Result<ClientCredentials, ConfigError> {
        self.config.client_credentials()
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    pub fn userinfo_url(&self) -> &str {
        &self.userinfo_url
    }

    /// Consent URL requesting offline access with forced re-consent.
    pub fn build_login_url(&self) -> Result<String, ConfigError> {
        let credentials = self.credentials()?;
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(STATE_LENGTH)
            .map(char::from)
            .collect();
        let scope = self.scopes.join(" ");

        let url = url::Url::parse_with_params(
            &self.auth_url,
            &[
                ("response_type", "code"),
                ("client_id", credentials.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", scope.as_str()),
                ("state", state.as_str()),
                ("access_type", "offline"),
                ("include_granted_scopes", "true"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| ConfigError::InvalidValue("GOOGLE_AUTH_URL".to_string(), e.to_string()))?;

        debug!("Generated consent URL with {} scopes", self.scopes.len());
        Ok(url.to_string())
    }

    /// Exchanges a one-time authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> GoogleResult<Credentials> {
        let credentials = self
            .credentials()
            .map_err(|e| GoogleApiError::AuthError(e.to_string()))?;

        let params = [
            ("code", code),
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ];

        debug!(
            "Exchanging authorization code {} at {}",
            redact(code),
            self.token_url
        );

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        debug!("Token exchange response status: {}", status);

        let body = response
            .text()
            .await
            .map_err(|e| GoogleApiError::NetworkError(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            error!("Token exchange failed. Status: {}, Error: {}", status, body);
            return Err(GoogleApiError::AuthError(format!(
                "Token exchange failed ({}): {}",
                status.as_u16(),
                provider_message(&body)
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            error!("Failed to parse token response: {}", e);
            GoogleApiError::FormatError(format!("Failed to parse token response: {}", e))
        })?;

        let scopes = match token.scope {
            Some(scope) if !scope.trim().is_empty() => {
                scope.split_whitespace().map(str::to_string).collect()
            }
            _ => self.scopes.clone(),
        };

        debug!(
            "Token exchange succeeded, access token {} valid for {:?} seconds",
            redact(&token.access_token),
            token.expires_in
        );

        Ok(Credentials {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_uri: self.token_url.clone(),
            client_id: credentials.client_id,
            client_secret: credentials.client_secret,
            scopes,
        })
    }

    /// Trades a refresh token for a new access token.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> GoogleResult<String> {
        let credentials = self
            .credentials()
            .map_err(|e| GoogleApiError::AuthError(e.to_string()))?;

        let params = [
            ("client_id", credentials.client_id.as_str()),
            ("client_secret", credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        debug!("Requesting token refresh from {}", self.token_url);
        if log::log_enabled!(log::Level::Debug) {
            debug!("Using client_id: {} (truncated)", redact(&credentials.client_id));
            debug!("Using refresh_token: {} (truncated)", redact(refresh_token));
        }

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GoogleApiError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no response body>".to_string());

        if !status.is_success() {
            error!("Token refresh failed. Status: {}, Error: {}", status, body);
            return Err(GoogleApiError::AuthError(format!(
                "Failed to refresh token. Status: {}, Error: {}",
                status.as_u16(),
                provider_message(&body)
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| GoogleApiError::FormatError(format!("Failed to parse token response: {}", e)))?;

        debug!("Token refreshed: {} (truncated)", redact(&token.access_token));
        Ok(token.access_token)
    }

    /// Handles the OAuth redirect. Each code reaches the token endpoint at
    /// most once while an earlier exchange for it is in flight or succeeded;
    /// replays get the cached response.
    pub async fn handle_callback(
        &self,
        store: &dyn CodeStore,
        code: &str,
    ) -> ApiResult<CallbackResponse> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ApiError::BadRequest(
                "Missing authorization code".to_string(),
            ));
        }

        // Configuration problems must not consume the code.
        self.credentials()?;

        let ticket = match store.claim(code).await {
            CodeClaim::Replay(cached) => {
                info!("Authorization code {} already exchanged, replaying", redact(code));
                return Ok(cached);
            }
            CodeClaim::Fresh(ticket) => ticket,
        };

        let credentials = match self.exchange_code(code).await {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!("Exchange for code {} failed, releasing it", redact(code));
                drop(ticket);
                return Err(ApiError::Exchange(truncate_detail(&e.to_string())));
            }
        };

        let user_info = match fetch_identity(&self.http, &self.userinfo_url, &credentials.access_token).await
        {
            Ok(identity) => {
                info!("User authenticated: {}", identity.email);
                Some(identity)
            }
            Err(e) => {
                warn!("Could not verify credentials after exchange: {}", e);
                None
            }
        };

        let response = CallbackResponse::new(credentials, user_info);
        ticket.complete(response.clone());
        Ok(response)
    }
}

/// Identity resolved from a request's bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub identity: Identity,
    pub access_token: String,
}

/// The single authentication gate for mail and calendar handlers.
#[derive(Debug, Clone)]
pub struct BearerValidator {
    oauth: OAuthClient,
    http: Client,
}

impl BearerValidator {
    pub fn new(http: Client, oauth: OAuthClient) -> Self {
        Self { oauth, http }
    }

    fn credentials_for(&self, access_token: &str, refresh_token: Option<&str>) -> Credentials {
        Credentials {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            token_uri: self.oauth.token_url().to_string(),
            client_id: self.oauth.config.client_id.clone().unwrap_or_default(),
            client_secret: self.oauth.config.client_secret.clone().unwrap_or_default(),
            scopes: self.oauth.scopes.clone(),
        }
    }

    /// Resolves `bearer` to an identity. With a refresh token, an expired
    /// access token is refreshed once before giving up.
    pub async fn resolve(
        &self,
        bearer: &str,
        refresh_token: Option<&str>,
    ) -> ApiResult<AuthenticatedUser> {
        let token = normalize_bearer(bearer)
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;
        let mut credentials = self.credentials_for(token, refresh_token);

        match fetch_identity(&self.http, self.oauth.userinfo_url(), &credentials.access_token).await {
            Ok(identity) => Ok(AuthenticatedUser {
                identity,
                access_token: credentials.access_token,
            }),
            Err(e) if e.is_unauthorized() && credentials.refresh_token.is_some() => {
                debug!("Access token rejected, attempting refresh");
                let refresh = credentials.refresh_token.clone().unwrap_or_default();
                credentials.access_token = self
                    .oauth
                    .refresh_access_token(&refresh)
                    .await
                    .map_err(|e| ApiError::Unauthorized(truncate_detail(&e.to_string())))?;

                let identity =
                    fetch_identity(&self.http, self.oauth.userinfo_url(), &credentials.access_token)
                        .await
                        .map_err(|e| ApiError::Unauthorized(truncate_detail(&e.to_string())))?;
                Ok(AuthenticatedUser {
                    identity,
                    access_token: credentials.access_token,
                })
            }
            Err(e) => {
                debug!("Bearer validation failed: {}", e);
                Err(ApiError::Unauthorized(truncate_detail(&e.to_string())))
            }
        }
    }
}
