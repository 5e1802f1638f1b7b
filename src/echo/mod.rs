//! Request echoing
//!
//! [`RequestSnapshot::extract`] captures a request's method, path, headers,
//! query parameters and body; [`Responder`] renders that snapshot as
//! `{"request": {...}}` JSON.
//!
//! Repeated header names and query parameters collapse to the last value
//! received. This loses data on purpose: the response shape is one string per
//! name.

pub mod responder;
pub mod snapshot;


pub use responder::{EchoEncoder, JsonEncoder, Responder, ResponderConfig};
pub use snapshot::{EchoResponse, HeaderMap, QueryMap, RequestSnapshot};
