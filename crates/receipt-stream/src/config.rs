use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_API_URL: &str = "RECEIPT_API_URL";
pub const ENV_REQUEST_TIMEOUT: &str = "RECEIPT_REQUEST_TIMEOUT_SECS";
pub const ENV_STREAM_IDLE: &str = "RECEIPT_STREAM_IDLE_SECS";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("base URL `{0}` must start with http:// or https://")]
    BaseUrl(String),
    #[error("{var} must be a positive number of seconds, got `{value}`")]
    Seconds { var: &'static str, value: String },
}

/// Where the backend lives and how long to wait on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// Applies to the start request and the one-shot fetch. The stream itself
    /// is long-lived and only bounded by `stream_idle_timeout`.
    pub request_timeout: Duration,
    /// Fail the job when no frame arrives for this long. `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stream_idle_timeout: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `RECEIPT_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            config = config.with_base_url(&url)?;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            config.request_timeout = parse_secs(ENV_REQUEST_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_STREAM_IDLE) {
            config.stream_idle_timeout = Some(parse_secs(ENV_STREAM_IDLE, &raw)?);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, url: &str) -> Result<Self, ConfigError> {
        let url = url.trim().trim_end_matches('/');
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::BaseUrl(url.to_string()));
        }
        self.base_url = url.to_string();
        Ok(self)
    }
}

fn parse_secs(var: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Seconds {
            var,
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.stream_idle_timeout, None);
    }

    #[test]
    fn env_overrides() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://receipts.example.com/"),
            (ENV_REQUEST_TIMEOUT, "5"),
            (ENV_STREAM_IDLE, "90"),
        ]))
        .unwrap();
        assert_eq!(config.base_url, "https://receipts.example.com");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn rejects_bad_values() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_API_URL, "localhost:8000")])).unwrap_err();
        assert!(matches!(err, ConfigError::BaseUrl(_)));

        for bad in ["0", "-1", "soon"] {
            let err =
                ClientConfig::from_lookup(lookup(&[(ENV_REQUEST_TIMEOUT, bad)])).unwrap_err();
            assert!(err.to_string().contains(ENV_REQUEST_TIMEOUT), "{bad}");
        }
    }
}
