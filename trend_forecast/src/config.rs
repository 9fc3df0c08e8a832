//! Runtime configuration
//!
//! Sources, lowest priority first:
//! 1. Built-in defaults
//! 2. An optional TOML file
//! 3. `ORION_`-prefixed environment variables (e.g. `ORION_RETRIES=3`)

use crate::error::{ForecastError, Result};
use crate::request::RetryPolicy;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "ORION_";

/// Settings for the forecasting panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// URL of the `/prever` endpoint
    pub endpoint: String,
    /// Extra attempts after a 429 or network failure
    pub retries: u32,
    /// First backoff delay, doubled on each retry
    pub initial_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub cache_ttl_ms: u64,
    /// Whether cache keys ignore topic case
    pub fold_cache_key_case: bool,
    pub history_capacity: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferences_path: Option<PathBuf>,
    /// Number of forecast points
    pub horizon: usize,
    pub moving_average_window: usize,
    pub articles_per_page: usize,
    /// Noise amplitude of the synthetic sentiment curve
    pub sentiment_jitter: f64,
    pub log_level: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5000/prever".to_string(),
            retries: 2,
            initial_delay_ms: 800,
            request_timeout_secs: 30,
            cache_ttl_ms: 120_000,
            fold_cache_key_case: true,
            history_capacity: 40,
            history_path: None,
            preferences_path: None,
            horizon: 7,
            moving_average_window: 3,
            articles_per_page: 6,
            sentiment_jitter: 2.0,
            log_level: "info".to_string(),
        }
    }
}

impl ForecastConfig {
    /// Defaults, then `path` if given and present, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        Self::from_figment(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Extract and validate from an arbitrary provider stack
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| ForecastError::ConfigError(format!("Failed to load configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ForecastError::ConfigError("endpoint must not be empty".to_string()));
        }
        if self.horizon == 0 {
            return Err(ForecastError::ConfigError("horizon must be at least 1".to_string()));
        }
        if self.moving_average_window == 0 {
            return Err(ForecastError::ConfigError(
                "moving_average_window must be at least 1".to_string(),
            ));
        }
        if self.articles_per_page == 0 {
            return Err(ForecastError::ConfigError(
                "articles_per_page must be at least 1".to_string(),
            ));
        }
        if !self.sentiment_jitter.is_finite() || self.sentiment_jitter < 0.0 {
            return Err(ForecastError::ConfigError(
                "sentiment_jitter must be a non-negative number".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
