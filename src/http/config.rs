use crate::config::ServiceConfig;
use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the HTTP transport
///
/// # Examples
///
/// ```rust
/// use echo_service::http::HttpConfig;
/// use std::time::Duration;
///
/// let config = HttpConfig {
///     bind_addr: "127.0.0.1:8080".parse().unwrap(),
///     read_timeout: Duration::from_secs(5),
///     ..HttpConfig::default()
/// };
/// assert_eq!(config.buffer_size, 8192);
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Network address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Read buffer size; also the largest accepted request head
    pub buffer_size: usize,
    /// Largest accepted request body
    pub max_body_size: usize,
    /// Read timeout, including the idle time between keep-alive requests
    pub read_timeout: Duration,
    /// Write timeout for responses
    pub write_timeout: Duration,
    /// Value of the `Server` response header
    pub server_name: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], crate::config::DEFAULT_HTTP_PORT)),
            max_connections: 10_000,
            buffer_size: 8192,
            max_body_size: 4 * 1024 * 1024,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            server_name: "echo-service".to_string(),
        }
    }
}

impl From<&ServiceConfig> for HttpConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            bind_addr: config.bind_addr(),
            ..Self::default()
        }
    }
}
