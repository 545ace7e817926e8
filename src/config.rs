//! Handler configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables of the form `FAULTLINE__<KEY>`
//! (e.g. `FAULTLINE__MAX_LOG_ENTRIES=50`).

use std::path::Path;
use std::time::Duration;

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::Backoff;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "FAULTLINE";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] ::config::ConfigError),

    #[error("invalid configuration path: {0}")]
    InvalidPath(String),

    #[error("invalid reporting endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("retry_delay_ms must be greater than zero when retry is enabled")]
    ZeroRetryDelay,
}

/// Behaviour switches of an [`ErrorHandler`](crate::handler::ErrorHandler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Append handled faults to the bounded log.
    pub enable_logging: bool,
    /// Send reports to `reporting_endpoint`.
    pub enable_reporting: bool,
    pub reporting_endpoint: Option<String>,
    pub max_log_entries: usize,
    /// Show a message on the feedback surface.
    pub enable_user_feedback: bool,
    /// Track retry eligibility of retryable faults.
    pub enable_retry: bool,
    pub retry_attempts: u32,
    /// Base delay between eligibility re-checks.
    pub retry_delay_ms: u64,
    /// Enables diagnostic logging (`log_info`, `log_warning`).
    pub dev_mode: bool,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            enable_reporting: false,
            reporting_endpoint: None,
            max_log_entries: 100,
            enable_user_feedback: true,
            enable_retry: true,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            dev_mode: false,
        }
    }
}

impl HandlerConfig {
    /// Loads defaults, the optional file at `path` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            let path_str = path
                .to_str()
                .ok_or_else(|| ConfigError::InvalidPath(format!("{:?}", path)))?;
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path_str.to_string()));
            }
            builder = builder.add_source(File::new(path_str, FileFormat::Toml));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let handler_config: HandlerConfig = config.try_deserialize()?;
        handler_config.validate()?;
        Ok(handler_config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Parses TOML text on top of the defaults. No environment overrides.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        let handler_config: HandlerConfig = config.try_deserialize()?;
        handler_config.validate()?;
        Ok(handler_config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(endpoint) = &self.reporting_endpoint {
            reqwest::Url::parse(endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        }
        if self.enable_retry && self.retry_delay_ms == 0 {
            return Err(ConfigError::ZeroRetryDelay);
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.retry_delay())
    }

    /// The endpoint to report to, if reporting is switched on.
    pub fn active_endpoint(&self) -> Option<&str> {
        if self.enable_reporting {
            self.reporting_endpoint.as_deref()
        } else {
            None
        }
    }

    pub fn with_max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = max;
        self
    }

    pub fn with_reporting(mut self, endpoint: impl Into<String>) -> Self {
        self.enable_reporting = true;
        self.reporting_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_user_feedback(mut self, enabled: bool) -> Self {
        self.enable_user_feedback = enabled;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.enable_logging = enabled;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.enable_retry = true;
        self.retry_attempts = attempts;
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.enable_retry = false;
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }
}
