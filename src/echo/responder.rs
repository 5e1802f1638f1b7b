use super::snapshot::{EchoResponse, RequestSnapshot};
use crate::config::ServiceConfig;
use crate::http::IncomingRequest;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use std::time::Duration;
use tracing::error;

/// Turns an [`EchoResponse`] into body bytes
pub trait EchoEncoder: Send + Sync {
    fn encode(&self, response: &EchoResponse) -> Result<Vec<u8>, serde_json::Error>;
}

/// Compact `serde_json` encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl EchoEncoder for JsonEncoder {
    fn encode(&self, response: &EchoResponse) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(response)
    }
}

/// Settings the responder is built from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponderConfig {
    /// Fixed delay before every response; zero means none
    pub response_delay: Option<Duration>,
}

impl From<&ServiceConfig> for ResponderConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            response_delay: config.response_delay,
        }
    }
}

/// Builds the echo response for each request
///
/// Built once and shared by every connection; it holds no per-request state.
///
/// # Examples
///
/// ```
/// use echo_service::{IncomingRequest, Responder, ResponderConfig};
///
/// # tokio_test::block_on(async {
/// let responder = Responder::new(ResponderConfig::default());
/// let request = IncomingRequest::new("GET", "/foobar?aaa=bbb");
///
/// let response = responder.handle(&request).await;
/// assert_eq!(response.status(), 200);
/// assert_eq!(
///     response.body().as_ref(),
///     br#"{"request":{"headers":{},"query":{"aaa":"bbb"},"path":"/foobar","method":"GET"}}"#
/// );
/// # });
/// ```
#[derive(Debug)]
pub struct Responder<E = JsonEncoder> {
    delay: Option<Duration>,
    encoder: E,
}

impl Responder<JsonEncoder> {
    pub fn new(config: ResponderConfig) -> Self {
        Self::with_encoder(config, JsonEncoder)
    }
}

impl<E: EchoEncoder> Responder<E> {
    pub fn with_encoder(config: ResponderConfig, encoder: E) -> Self {
        Self {
            delay: config.response_delay.filter(|delay| !delay.is_zero()),
            encoder,
        }
    }

    pub fn response_delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Extracts a snapshot of `request` and answers with it.
    pub async fn handle(&self, request: &IncomingRequest) -> Response<Bytes> {
        self.respond(RequestSnapshot::extract(request)).await
    }

    /// Answers with `snapshot`: 200 with the JSON document, or 500 with an
    /// empty body if encoding fails. Both carry `Content-Type: application/json`.
    pub async fn respond(&self, snapshot: RequestSnapshot) -> Response<Bytes> {
        let mut response = Response::new(Bytes::new());
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.encoder.encode(&EchoResponse { request: snapshot }) {
            Ok(body) => {
                *response.status_mut() = StatusCode::OK;
                *response.body_mut() = Bytes::from(body);
            }
            Err(e) => {
                error!(error = %e, "error marshalling response");
                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            }
        }
        response
    }
}
