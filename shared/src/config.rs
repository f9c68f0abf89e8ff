use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::DEFAULT_POLL_INTERVAL;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_GEOCODER_BASE_URL: &str = "https://nominatim.openstreetmap.org";

pub const ENV_API_URL: &str = "RESPONDER_API_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "RESPONDER_POLL_INTERVAL_MS";
pub const ENV_MAX_POLL_ATTEMPTS: &str = "RESPONDER_MAX_POLL_ATTEMPTS";
pub const ENV_GEOCODER_URL: &str = "RESPONDER_GEOCODER_URL";
pub const ENV_MAPS_API_KEY: &str = "RESPONDER_MAPS_API_KEY";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {name}: {reason}")]
    InvalidUrl { name: &'static str, reason: String },

    #[error("invalid {name}: {value}")]
    InvalidNumber { name: &'static str, value: String },

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("max poll attempts must be greater than zero, leave it unset to poll without a limit")]
    ZeroPollLimit,
}

/// Runtime settings of the core. The shell usually builds one with
/// [`ClientConfig::from_env`] and hands it over with `Event::Configure`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub poll_interval_ms: u64,
    /// `None` polls until the backend reports a terminal status.
    pub max_poll_attempts: Option<u32>,
    pub geocoder_base_url: String,
    pub maps_api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            poll_interval_ms: u64::try_from(DEFAULT_POLL_INTERVAL.as_millis()).unwrap_or(5000),
            max_poll_attempts: None,
            geocoder_base_url: DEFAULT_GEOCODER_BASE_URL.to_string(),
            maps_api_key: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = non_empty(ENV_API_URL) {
            config.api_base_url = url;
        }
        if let Some(value) = non_empty(ENV_POLL_INTERVAL_MS) {
            config.poll_interval_ms = value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: ENV_POLL_INTERVAL_MS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = non_empty(ENV_MAX_POLL_ATTEMPTS) {
            let attempts = value.parse().map_err(|_| ConfigError::InvalidNumber {
                name: ENV_MAX_POLL_ATTEMPTS,
                value: value.clone(),
            })?;
            config.max_poll_attempts = Some(attempts);
        }
        if let Some(url) = non_empty(ENV_GEOCODER_URL) {
            config.geocoder_base_url = url;
        }
        config.maps_api_key = non_empty(ENV_MAPS_API_KEY);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::check_url("api_base_url", &self.api_base_url)?;
        Self::check_url("geocoder_base_url", &self.geocoder_base_url)?;
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.max_poll_attempts == Some(0) {
            return Err(ConfigError::ZeroPollLimit);
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
        let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
            name,
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl {
                name,
                reason: format!("'{value}' is not an http(s) URL"),
            });
        }
        Ok(())
    }
}
