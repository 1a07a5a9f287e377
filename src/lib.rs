/// PA Agent API
///
/// Backend for the PA Agent web app: Google sign-in, Gmail and Calendar
/// helpers, and LLM-backed writing assistants for documents, code and chat.
///
/// # Features
///
/// - OAuth consent URL and callback with authorization-code replay protection
/// - Bearer-token validation against the userinfo endpoint, with optional refresh
/// - Unread mail summaries, reply drafts and sending
/// - Upcoming events and natural-language event creation with a safe fallback
/// - Project plans, report templates, presentation outlines
/// - Code review, refactoring suggestions and explanations
/// - Single-turn chat, streamed as server-sent events
///
/// # Testing
///
/// Unit tests live next to the code. Integration tests in `tests/` drive the
/// router against mockito stand-ins for Google and Gemini.
pub mod auth;
pub mod calendar_api;
pub mod code_store;
pub mod config;
pub mod errors;
pub mod event_draft;
pub mod gmail_api;
pub mod llm;
pub mod prompts;
pub mod server;

pub use crate::code_store::{CodeStore, MemoryCodeStore};
pub use crate::config::Config;
pub use crate::errors::{ApiError, ApiResult};
pub use crate::logging::setup_logging;
pub use crate::server::{router, AppState};

pub mod logging {
    use chrono::Local;
    use log::LevelFilter;
    use simplelog::{self, CombinedLogger, WriteLogger};
    use std::fs::OpenOptions;
    use std::io::Write;

    /// Default log file name for the current hour.
    pub fn default_log_path() -> String {
        format!("pa_agent_{}.log", Local::now().format("%Y%m%d_%H"))
    }

    /// Sets up logging to a file.
    ///
    /// # Arguments
    ///
    /// * `log_level` - The level of log messages to capture
    /// * `log_file` - Optional path to log file. If None, creates a timestamped file
    ///
    /// # Returns
    ///
    /// The path to the log file
    pub fn setup_logging(
        log_level: LevelFilter,
        log_file: Option<&str>,
    ) -> std::io::Result<String> {
        let log_path = match log_file {
            Some(path) => path.to_string(),
            None => default_log_path(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        writeln!(
            file,
            "====== PA AGENT API LOG - Started at {} ======",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        )?;

        CombinedLogger::init(vec![WriteLogger::new(
            log_level,
            simplelog::Config::default(),
            file,
        )])
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        log::info!("Logging initialized to file: {}", log_path);
        Ok(log_path)
    }
}
