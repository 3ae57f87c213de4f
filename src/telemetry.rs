//! Structured logging setup.
//!
//! The dispatcher itself only emits `tracing` events; embedding applications that have no
//! subscriber of their own can install one here. Settings come from the environment:
//!
//! | Variable                             | Default | Meaning                                   |
//! |--------------------------------------|---------|-------------------------------------------|
//! | `RESTDISPATCH_LOG_LEVEL`             | `info`  | trace/debug/info/warn/error               |
//! | `RESTDISPATCH_LOG_FORMAT`            | `json`  | json/pretty                               |
//! | `RESTDISPATCH_LOG_TARGET_FILTER`     | unset   | extra comma-separated filter directives   |
//! | `RESTDISPATCH_LOG_ASYNC`             | `false` | write through a non-blocking worker       |
//! | `RESTDISPATCH_LOG_INCLUDE_LOCATION`  | `false` | include file and line                     |
//!
//! `RUST_LOG`, when set, takes precedence over `RESTDISPATCH_LOG_LEVEL`.

use std::env;

use anyhow::{Context, Result};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

pub const ENV_LOG_LEVEL: &str = "RESTDISPATCH_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "RESTDISPATCH_LOG_FORMAT";
pub const ENV_LOG_TARGET_FILTER: &str = "RESTDISPATCH_LOG_TARGET_FILTER";
pub const ENV_LOG_ASYNC: &str = "RESTDISPATCH_LOG_ASYNC";
pub const ENV_LOG_INCLUDE_LOCATION: &str = "RESTDISPATCH_LOG_INCLUDE_LOCATION";

/// Log format: JSON for production, pretty-print for development
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub log_level: String,
    pub format: LogFormat,
    /// Additional filter directives, comma-separated (`restdispatch::path=trace,...`).
    pub target_filter: Option<String>,
    pub async_logging: bool,
    pub include_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            format: LogFormat::Json,
            target_filter: None,
            async_logging: false,
            include_location: false,
        }
    }
}

impl LogConfig {
    /// Reads `RESTDISPATCH_LOG_*`; unset or unparseable values fall back to the defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_level: env::var(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            format: env::var(ENV_LOG_FORMAT)
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.format),
            target_filter: env::var(ENV_LOG_TARGET_FILTER).ok(),
            async_logging: env_flag(ENV_LOG_ASYNC).unwrap_or(defaults.async_logging),
            include_location: env_flag(ENV_LOG_INCLUDE_LOCATION)
                .unwrap_or(defaults.include_location),
        }
    }

    /// Verbose, human readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            log_level: "debug".to_string(),
            format: LogFormat::Pretty,
            target_filter: None,
            async_logging: false,
            include_location: true,
        }
    }

    fn level(&self) -> Level {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    }

    /// The filter this configuration installs.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level().as_str()));
        if let Some(target_filter) = &self.target_filter {
            for directive in target_filter.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(_) => eprintln!("Warning: Invalid log filter directive: {directive}"),
                }
            }
        }
        filter
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

/// Installs the global subscriber.
///
/// With `async_logging` the returned guard owns the writer thread; keep it alive for as long as
/// logs should be flushed.
///
/// # Errors
///
/// A global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use restdispatch::telemetry::{init_logging_with_config, LogConfig};
///
/// let _guard = init_logging_with_config(&LogConfig::from_env())
///     .expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    if config.async_logging {
        let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());
        let fmt_layer = fmt_layer(config, non_blocking);
        registry
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize async logging")?;
        Ok(Some(guard))
    } else {
        registry
            .with(fmt_layer(config, std::io::stdout))
            .try_init()
            .context("Failed to initialize sync logging")?;
        Ok(None)
    }
}

/// [`init_logging_with_config`] with [`LogConfig::from_env`].
///
/// # Errors
///
/// A global subscriber is already installed.
pub fn init_logging() -> Result<Option<WorkerGuard>> {
    init_logging_with_config(&LogConfig::from_env())
}

type FilteredRegistry = Layered<EnvFilter, Registry>;

fn fmt_layer<W>(config: &LogConfig, writer: W) -> Box<dyn Layer<FilteredRegistry> + Send + Sync>
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_list(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_writer(writer)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("PRETTY"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("invalid"), LogFormat::Json);
    }

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.format, LogFormat::Json);
        assert!(!config.async_logging);
        assert!(!config.include_location);
    }

    #[test]
    fn test_development() {
        let config = LogConfig::development();
        assert_eq!(config.format, LogFormat::Pretty);
        assert_eq!(config.level(), Level::DEBUG);
        assert!(config.include_location);
    }

    #[test]
    fn test_unknown_level_is_info() {
        let config = LogConfig {
            log_level: "chatty".into(),
            ..LogConfig::default()
        };
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_filter_accepts_bad_directives() {
        let config = LogConfig {
            target_filter: Some("restdispatch::path=trace, ,not a directive[".into()),
            ..LogConfig::default()
        };
        // Invalid directives are reported and skipped.
        let _filter = config.env_filter();
    }
}
