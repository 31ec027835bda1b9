use std::path::PathBuf;

use crate::error::StoreError;

pub const DEFAULT_RESULT_LIMIT: usize = 20;
const HTTP_TIMEOUT_SECS: u64 = 6;
const HTTP_MAX_RETRIES: u64 = 0;
const HTTP_USER_AGENT: &str = "readlog/0.1";

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` resolves to the platform data directory at open time.
    pub db_path: Option<PathBuf>,
    pub google_books_url: String,
    pub open_library_url: String,
    pub open_library_covers_url: String,
    pub http_timeout_secs: u64,
    pub http_max_retries: u64,
    pub result_limit: usize,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            db_path: None,
            google_books_url: "https://www.googleapis.com".to_string(),
            open_library_url: "https://openlibrary.org".to_string(),
            open_library_covers_url: "https://covers.openlibrary.org".to_string(),
            http_timeout_secs: HTTP_TIMEOUT_SECS,
            http_max_retries: HTTP_MAX_RETRIES,
            result_limit: DEFAULT_RESULT_LIMIT,
            user_agent: HTTP_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `READLOG_DB` and `READLOG_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(path) = lookup("READLOG_DB").filter(|value| !value.trim().is_empty()) {
            self.db_path = Some(PathBuf::from(path));
        }
        if let Some(timeout) = lookup("READLOG_HTTP_TIMEOUT_SECS") {
            match timeout.trim().parse::<u64>() {
                Ok(value) if value > 0 => self.http_timeout_secs = value,
                _ => log::warn!("ignoring invalid READLOG_HTTP_TIMEOUT_SECS={}", timeout),
            }
        }
        self
    }

    pub fn resolve_db_path(&self) -> Result<PathBuf, StoreError> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(StoreError::DataDir)?;
        Ok(data_dir.join("readlog").join("readlog.db"))
    }
}
