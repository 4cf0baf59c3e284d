//! Configuration loading from the environment.

use std::time::Duration;

use thiserror::Error;
use tracing::warn;

pub const API_URL_VAR: &str = "LEANSTOCK_API_URL";
pub const API_TOKEN_VAR: &str = "LEANSTOCK_API_TOKEN";
pub const HTTP_TIMEOUT_VAR: &str = "LEANSTOCK_HTTP_TIMEOUT_SECS";
pub const HISTORY_DB_VAR: &str = "LEANSTOCK_HISTORY_DB";

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HISTORY_DB: &str = "sqlite://leanstock.db?mode=rwc";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is invalid: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockConfig {
    /// Root of the inventory REST API, without trailing slash.
    pub api_url: String,
    pub api_token: Option<String>,
    pub http_timeout: Duration,
    /// sqlx SQLite URL of the local history database.
    pub history_db: String,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_token: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            history_db: DEFAULT_HISTORY_DB.to_string(),
        }
    }
}

impl StockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let api_url = match get(API_URL_VAR) {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
                url.trim_end_matches('/').to_string()
            }
            Some(url) => {
                return Err(ConfigError::Invalid {
                    var: API_URL_VAR,
                    reason: format!("'{url}' is not an http(s) URL"),
                });
            }
            None => defaults.api_url,
        };

        let api_token = get(API_TOKEN_VAR);
        if api_token.is_none() {
            warn!("{API_TOKEN_VAR} not set; inventory API requests will be unauthenticated");
        }

        let http_timeout = match get(HTTP_TIMEOUT_VAR) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: HTTP_TIMEOUT_VAR,
                        reason: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
            },
            None => defaults.http_timeout,
        };

        let history_db = get(HISTORY_DB_VAR).unwrap_or(defaults.history_db);

        Ok(Self {
            api_url,
            api_token,
            http_timeout,
            history_db,
        })
    }
}
