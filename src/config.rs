use crate::error::{AppError, Result};

pub const POLYROUTER_API_URL: &str = "https://api.polyrouter.io/functions/v1";

/// Extra attempts after the first failed upstream request.
pub const UPSTREAM_RETRIES: u32 = 2;

/// Delay between upstream retries (milliseconds).
pub const UPSTREAM_RETRY_DELAY_MS: u64 = 1000;

/// Upstream request timeout (seconds).
pub const UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Channel capacity for fired alerts on their way to the notifier.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Persisted state keys. Each value is a JSON document.
pub mod keys {
    pub const ALERT_RULES: &str = "alerts:v1";
    pub const ALERT_HISTORY: &str = "alert_history:v1";
    pub const WATCHLIST: &str = "watchlist:v1";
}

/// Title clustering thresholds (Jaccard similarity of word sets).
pub mod cluster_thresholds {
    /// Looser threshold used by the compare view.
    pub const COMPARE: f64 = 0.3;
}

/// DB_PATH value that selects the non-persistent in-memory store.
pub const IN_MEMORY_DB_PATH: &str = ":memory:";

/// Compare view: markets requested from search.
pub const COMPARE_SEARCH_LIMIT: usize = 100;

/// Compare view: at most this many multi-market groups are returned.
pub const COMPARE_MAX_GROUPS: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub polyrouter_api_url: String,
    /// Sent as `X-API-Key` on every upstream request (POLYROUTER_API_KEY)
    pub polyrouter_api_key: Option<String>,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Seconds between alert evaluation ticks (POLL_INTERVAL_SECS)
    pub poll_interval_secs: u64,
    /// Markets requested per tick (MARKETS_FETCH_LIMIT)
    pub markets_fetch_limit: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            polyrouter_api_url: std::env::var("POLYROUTER_API_URL")
                .unwrap_or_else(|_| POLYROUTER_API_URL.to_string()),
            polyrouter_api_key: std::env::var("POLYROUTER_API_KEY")
                .ok()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "aggregator.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<u64>()
                .unwrap_or(30)
                .max(1),
            markets_fetch_limit: std::env::var("MARKETS_FETCH_LIMIT")
                .unwrap_or_else(|_| "100".to_string())
                .parse::<usize>()
                .unwrap_or(100),
        })
    }
}
