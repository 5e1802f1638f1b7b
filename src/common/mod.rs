//! Common traits and helpers used across the echo-service library
//!
//! This module contains the server trait and the helpers integration tests
//! and benchmarks use to run a server in the background.

pub mod test_utils;
pub mod traits;

pub use test_utils::{TestServer, spawn_test_server};
pub use traits::EchoServerTrait;
