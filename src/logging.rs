//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so that command output on stdout stays
//! machine-readable. `RUST_LOG` takes precedence over the configured level.

use tracing_subscriber::{fmt, EnvFilter};

/// Log level for the subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Disable logging entirely
    Off,
}

impl LogLevel {
    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<u8> for LogLevel {
    /// 0 = Info, 1 = Debug, 2+ = Trace
    fn from(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Error returned when a global subscriber is already installed.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct LoggingError(String);

/// Subscriber options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub with_timestamps: bool,
    /// Include the module path of each event.
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamps: true,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_timestamps(mut self, enabled: bool) -> Self {
        self.with_timestamps = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    /// Sets both file and line-number output.
    pub fn with_source_location(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self.with_line_number = enabled;
        self
    }

    /// Level from a `-v` count, raised to at least `debug` in dev mode.
    pub fn for_mode(dev_mode: bool, verbosity: u8) -> Self {
        let mut level = LogLevel::from(verbosity);
        if dev_mode && level == LogLevel::Info {
            level = LogLevel::Debug;
        }
        Self::default()
            .with_level(level)
            .with_source_location(dev_mode)
    }

    fn env_filter(&self) -> EnvFilter {
        if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(self.level.as_directive())
        }
    }
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn try_init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_file(config.with_file)
        .with_line_number(config.with_line_number);

    let result = if config.with_timestamps {
        subscriber.try_init()
    } else {
        subscriber.without_time().try_init()
    };
    result.map_err(|e| LoggingError(e.to_string()))
}

/// Like [`try_init`], ignoring an already-installed subscriber.
pub fn init_logging(config: &LoggingConfig) {
    if let Err(e) = try_init(config) {
        tracing::debug!(error = %e, "Keeping existing tracing subscriber");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from(0), LogLevel::Info);
        assert_eq!(LogLevel::from(1), LogLevel::Debug);
        assert_eq!(LogLevel::from(2), LogLevel::Trace);
        assert_eq!(LogLevel::from(10), LogLevel::Trace);
    }

    #[test]
    fn test_dev_mode_raises_default_level() {
        let config = LoggingConfig::for_mode(true, 0);
        assert_eq!(config.level, LogLevel::Debug);
        assert!(config.with_file);
        assert!(config.with_line_number);

        let config = LoggingConfig::for_mode(false, 0);
        assert_eq!(config.level, LogLevel::Info);
        assert!(!config.with_file);

        let config = LoggingConfig::for_mode(true, 2);
        assert_eq!(config.level, LogLevel::Trace);
    }

    #[test]
    fn test_second_init_is_an_error() {
        let config = LoggingConfig::new().with_level(LogLevel::Off);
        let _ = try_init(&config);
        assert!(try_init(&config).is_err());
    }
}
