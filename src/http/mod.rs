//! HTTP/1.x transport
//!
//! A small HTTP server written directly on `tokio::net`: [`HttpCodec`] frames
//! requests and responses with `httparse`, [`HttpEchoServer`] runs the accept
//! loop and per-connection tasks, and [`HttpEchoClient`] is a matching client
//! used by tests and benchmarks.

pub mod client;
pub mod codec;
pub mod config;
pub mod request;
pub mod server;

#[cfg(test)]
mod tests;

pub use client::{EchoReply, HttpEchoClient};
pub use codec::{HttpCodec, HttpError, ResponseFrame};
pub use config::HttpConfig;
pub use request::IncomingRequest;
pub use server::HttpEchoServer;
