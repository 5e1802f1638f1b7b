use crate::http::IncomingRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;
use url::form_urlencoded;

/// Header name (as received) to value. A repeated name keeps its last value.
pub type HeaderMap = BTreeMap<String, String>;

/// Query parameter name to value. A repeated name keeps its last value.
pub type QueryMap = BTreeMap<String, String>;

/// Everything the echo response reports about one request
///
/// Field order is the order of the JSON object. Maps are ordered by key so
/// two identical requests always serialize to identical bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSnapshot {
    pub headers: HeaderMap,
    pub query: QueryMap,
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

/// The JSON document sent back to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EchoResponse {
    pub request: RequestSnapshot,
}

impl RequestSnapshot {
    /// Captures `request`.
    ///
    /// Nothing is validated: method, path, header names and values pass
    /// through verbatim. Repeated headers and query parameters collapse to
    /// their last occurrence, and bytes that are not UTF-8 are replaced with
    /// U+FFFD.
    pub fn extract(request: &IncomingRequest) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            headers.insert(name.clone(), String::from_utf8_lossy(value).into_owned());
        }

        let (path, query_string) = split_target(&request.target);

        let mut query = QueryMap::new();
        for (key, value) in form_urlencoded::parse(query_string.as_bytes()) {
            query.insert(key.into_owned(), value.into_owned());
        }

        let body = String::from_utf8_lossy(&request.body).into_owned();

        debug!(
            path = %path,
            headers = ?headers,
            query = ?query,
            body = %body,
            "incoming request"
        );

        Self {
            headers,
            query,
            path: path.to_string(),
            method: request.method.clone(),
            body,
        }
    }
}

/// Splits a request target into its path and raw query string.
///
/// Absolute-form targets (`http://host/p?q`) lose their scheme and authority;
/// a missing path there becomes `/`. Anything after `#` is dropped.
fn split_target(target: &str) -> (&str, &str) {
    let target = target.split_once('#').map_or(target, |(before, _)| before);
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    if path.starts_with('/') {
        return (path, query);
    }
    match path.split_once("://") {
        Some((_, rest)) => (rest.find('/').map_or("/", |start| &rest[start..]), query),
        None => (path, query),
    }
}
