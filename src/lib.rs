use crate::http::HttpError;
use thiserror::Error;

/// Error types for the echo-service library
#[derive(Error, Debug)]
pub enum EchoError {
    /// Socket errors (bind, accept, read, write)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors, reported before the listener is bound
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP framing errors raised by the transport
    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    /// Timeout errors
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// JSON decoding errors (client side)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the echo-service library
pub type Result<T> = std::result::Result<T, EchoError>;

pub mod common;
pub mod config;
pub mod echo;
pub mod http;
pub mod logging;

// Re-export main types for convenience
pub use common::EchoServerTrait;
pub use config::{LogLevel, ServiceConfig};
pub use echo::{
    EchoEncoder, EchoResponse, HeaderMap, JsonEncoder, QueryMap, RequestSnapshot, Responder,
    ResponderConfig,
};
pub use http::{HttpConfig, HttpEchoClient, HttpEchoServer, IncomingRequest};
