use crate::errors::ConfigError;
use dotenv::dotenv;
use log::{debug, warn};
use std::env;

// API URL constants
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
pub const GMAIL_API_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1";
pub const CALENDAR_API_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/auth/callback";
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

pub const DEFAULT_SCOPES: [&str; 5] = [
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/calendar.events",
];

/// Remote endpoints the service talks to. Overridable so tests can point
/// everything at a local stub server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    pub gmail_base_url: String,
    pub calendar_base_url: String,
    pub gemini_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: OAUTH_TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
            gmail_base_url: GMAIL_API_BASE_URL.to_string(),
            calendar_base_url: CALENDAR_API_BASE_URL.to_string(),
            gemini_base_url: GEMINI_API_BASE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Points every endpoint at `base` (a stub server), keeping the real paths.
    pub fn local(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            auth_url: format!("{}/o/oauth2/auth", base),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/oauth2/v2/userinfo", base),
            gmail_base_url: format!("{}/gmail/v1", base),
            calendar_base_url: format!("{}/calendar/v3", base),
            gemini_base_url: format!("{}/v1beta", base),
        }
    }
}

/// OAuth client credentials, only available when both halves are configured.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub allowed_origins: Vec<String>,
    pub scopes: Vec<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub bind_address: String,
    pub endpoints: Endpoints,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            allowed_origins: split_list(DEFAULT_ALLOWED_ORIGINS),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file if present
        // If DOTENV_PATH is set, use that path, otherwise use default
        if let Ok(path) = env::var("DOTENV_PATH") {
            if let Err(e) = dotenv::from_path(&path) {
                warn!("Could not load env file {}: {}", path, e);
            }
        } else {
            let _ = dotenv();
        }

        debug!("Loading PA Agent configuration from environment");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Endpoints::default();
        let endpoints = Endpoints {
            auth_url: get("GOOGLE_AUTH_URL").unwrap_or(defaults.auth_url),
            token_url: get("GOOGLE_TOKEN_URL").unwrap_or(defaults.token_url),
            userinfo_url: get("GOOGLE_USERINFO_URL").unwrap_or(defaults.userinfo_url),
            gmail_base_url: get("GMAIL_API_BASE_URL").unwrap_or(defaults.gmail_base_url),
            calendar_base_url: get("CALENDAR_API_BASE_URL")
                .unwrap_or(defaults.calendar_base_url),
            gemini_base_url: get("GEMINI_API_BASE_URL").unwrap_or(defaults.gemini_base_url),
        };

        for (name, value) in [
            ("GOOGLE_AUTH_URL", &endpoints.auth_url),
            ("GOOGLE_TOKEN_URL", &endpoints.token_url),
            ("GOOGLE_USERINFO_URL", &endpoints.userinfo_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))?;
        }

        let scopes = match get("OAUTH_SCOPES") {
            Some(raw) => raw
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        let config = Config {
            client_id: get("GOOGLE_CLIENT_ID"),
            client_secret: get("GOOGLE_CLIENT_SECRET"),
            redirect_uri: get("REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string()),
            allowed_origins: split_list(
                &get("ALLOWED_ORIGINS").unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.to_string()),
            ),
            scopes,
            gemini_api_key: get("GEMINI_API_KEY"),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            bind_address: get("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            endpoints,
        };

        if config.client_id.is_none() || config.client_secret.is_none() {
            warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; sign-in will be unavailable");
        }
        if config.gemini_api_key.is_none() {
            warn!("GEMINI_API_KEY not set; text generation will fail or degrade");
        }

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Returns the OAuth client credentials or a configuration error naming
    /// the first missing variable.
    pub fn client_credentials(&self) -> Result<ClientCredentials, ConfigError> {
        let client_id = self
            .client_id
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_CLIENT_ID".to_string()))?;
        let client_secret = self
            .client_secret
            .clone()
            .ok_or_else(|| ConfigError::MissingEnvVar("GOOGLE_CLIENT_SECRET".to_string()))?;
        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
