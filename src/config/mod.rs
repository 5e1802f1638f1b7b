//! Process configuration
//!
//! The service is configured entirely through environment variables, read once
//! at startup into an immutable [`ServiceConfig`]:
//!
//! | Variable         | Meaning                                   | Default |
//! |------------------|-------------------------------------------|---------|
//! | `HTTP_PORT`      | TCP port bound on all interfaces          | `8080`  |
//! | `LOG_LEVEL`      | `trace`, `debug`, `info`, `warn`, `error`, `panic` or `fatal` | `info` |
//! | `RESPONSE_DELAY` | duration added before every response (`500ms`, `2s`) | none |

pub mod duration;

pub use duration::{DurationError, parse_duration};

use crate::{EchoError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub const HTTP_PORT_VAR: &str = "HTTP_PORT";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
pub const RESPONSE_DELAY_VAR: &str = "RESPONSE_DELAY";

pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Log verbosity
///
/// `panic` and `fatal` are accepted for compatibility with other deployments
/// of the service and behave like `error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parses a level name, falling back to `Info` for anything unrecognised.
    pub fn parse_or_default(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" | "panic" | "fatal" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    pub fn as_filter(&self) -> LevelFilter {
        match self {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Immutable service configuration
///
/// # Examples
///
/// ```
/// use echo_service::config::{LogLevel, ServiceConfig};
/// use std::time::Duration;
///
/// let config = ServiceConfig::from_lookup(|key| match key {
///     "HTTP_PORT" => Some("3000".to_string()),
///     "RESPONSE_DELAY" => Some("250ms".to_string()),
///     _ => None,
/// })
/// .unwrap();
///
/// assert_eq!(config.http_port, 3000);
/// assert_eq!(config.log_level, LogLevel::Info);
/// assert_eq!(config.response_delay, Some(Duration::from_millis(250)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Port bound on all interfaces
    pub http_port: u16,
    /// Minimum level of emitted log events
    pub log_level: LogLevel,
    /// Delay applied before writing each response; `None` means no delay
    pub response_delay: Option<Duration>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            log_level: LogLevel::default(),
            response_delay: None,
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let http_port = match read(HTTP_PORT_VAR) {
            Some(value) => value.trim().parse::<u16>().map_err(|e| {
                EchoError::Config(format!("invalid {HTTP_PORT_VAR} {value:?}: {e}"))
            })?,
            None => DEFAULT_HTTP_PORT,
        };

        let log_level = read(LOG_LEVEL_VAR)
            .map(|value| LogLevel::parse_or_default(&value))
            .unwrap_or_default();

        let response_delay = match read(RESPONSE_DELAY_VAR) {
            Some(value) => {
                let delay = parse_duration(value.trim()).map_err(|e| {
                    EchoError::Config(format!("invalid {RESPONSE_DELAY_VAR}: {e}"))
                })?;
                Some(delay).filter(|delay| !delay.is_zero())
            }
            None => None,
        };

        Ok(Self {
            http_port,
            log_level,
            response_delay,
        })
    }

    /// Listen address: the configured port on every interface
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.http_port))
    }
}
