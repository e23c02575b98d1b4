use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Tuning knobs for the progress engine's write-through worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Extra attempts after a failed write before it is dropped.
    pub write_retries: u32,
    /// Pause between write attempts.
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            write_retries: 2,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Connection settings for the optional progress backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl SyncConfig {
    /// Build a config after validating the base URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL does not parse or is
    /// not http(s).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        match Url::parse(&base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Self { base_url, timeout }),
            _ => Err(ConfigError::InvalidBaseUrl(base_url)),
        }
    }

    /// Read `DUO_API_BASE_URL` and `DUO_API_TIMEOUT_SECS`.
    ///
    /// Returns `Ok(None)` when no base URL is set, which leaves sync disabled.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but invalid.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(base_url) = env::var("DUO_API_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
        else {
            return Ok(None);
        };

        let timeout_secs = match env::var("DUO_API_TIMEOUT_SECS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidVar {
                    var: "DUO_API_TIMEOUT_SECS",
                    raw,
                })?,
            Err(_) => DEFAULT_API_TIMEOUT_SECS,
        };

        Self::new(base_url, Duration::from_secs(timeout_secs)).map(Some)
    }

    /// Full URL for an API path such as `/api/user/xp`.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let config = SyncConfig::new("http://localhost:5000/", Duration::from_secs(1)).unwrap();
        assert_eq!(config.endpoint("/api/user/xp"), "http://localhost:5000/api/user/xp");
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(SyncConfig::new("not a url", Duration::from_secs(1)).is_err());
        assert!(SyncConfig::new("ftp://example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn engine_defaults_retry() {
        let config = EngineConfig::default();
        assert_eq!(config.write_retries, 2);
    }
}
