use std::env;
use std::time::Duration;

use crate::services::list_pipeline::DEFAULT_PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub signal_database_url: String,
    pub signal_poll_interval: Duration,
    pub page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000".to_string(),
            api_token: None,
            signal_database_url: "sqlite://shared_signals.db?mode=rwc".to_string(),
            signal_poll_interval: Duration::from_millis(1000),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    /// Reads the process environment. Call `dotenvy::dotenv()` first if a
    /// `.env` file should be honoured.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let poll_ms: u64 = non_empty("SIGNAL_POLL_MS")
            .and_then(|v| v.parse().ok())
            .filter(|ms| *ms > 0)
            .unwrap_or(defaults.signal_poll_interval.as_millis() as u64);
        let page_size: usize = non_empty("LIST_PAGE_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.page_size);

        Self {
            api_base_url: non_empty("MARKETPLACE_API_URL").unwrap_or(defaults.api_base_url),
            api_token: non_empty("MARKETPLACE_API_TOKEN"),
            signal_database_url: non_empty("SIGNAL_DATABASE_URL")
                .unwrap_or(defaults.signal_database_url),
            signal_poll_interval: Duration::from_millis(poll_ms),
            page_size,
        }
    }
}
