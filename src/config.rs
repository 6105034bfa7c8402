// src/config.rs
// =============================================================================
// Runtime settings, loaded from a .env file (if any) and the environment.
//
// Recognised variables:
// - GITHUB_TOKEN               optional bearer token, raises the GitHub budget
// - NAMEPROBE_GITHUB_API_URL   API base url (default https://api.github.com)
// - NAMEPROBE_TIMEOUT_SECS     per-request timeout in seconds (default 5)
// - NAMEPROBE_LOG              fallback log filter when RUST_LOG is unset
// =============================================================================

use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// An API credential that never shows up in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

impl fmt::Display for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("NAMEPROBE_TIMEOUT_SECS must be a positive whole number of seconds, got `{value}`")]
    InvalidTimeout { value: String },
    #[error("NAMEPROBE_GITHUB_API_URL must be an http(s) url, got `{value}`")]
    InvalidApiUrl { value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub github_token: Option<ApiToken>,
    pub github_api_url: String,
    pub request_timeout: Duration,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from any key lookup; `load` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let github_token = lookup("GITHUB_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .map(ApiToken::new);

        let github_api_url = match lookup("NAMEPROBE_GITHUB_API_URL") {
            Some(value) => {
                let trimmed = value.trim().trim_end_matches('/').to_string();
                if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                    return Err(ConfigError::InvalidApiUrl { value });
                }
                trimmed
            }
            None => DEFAULT_GITHUB_API_URL.to_string(),
        };

        let request_timeout = match lookup("NAMEPROBE_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout { value }),
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let log_level = lookup("NAMEPROBE_LOG").unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Ok(Self {
            github_token,
            github_api_url,
            request_timeout,
            log_level,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.github_token.is_some()
    }
}
