use bytes::Bytes;
use http::Version;

/// One HTTP request as read off the wire
///
/// Header names keep the case they arrived with and repeated headers keep
/// their arrival order. The body has already been de-framed (Content-Length or
/// chunked) and is held entirely in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// Method token exactly as sent
    pub method: String,
    /// Request target from the request line (path, optional query)
    pub target: String,
    pub version: Version,
    /// Header name/value pairs in arrival order
    pub headers: Vec<(String, Bytes)>,
    pub body: Bytes,
}

impl IncomingRequest {
    /// Builds an HTTP/1.1 request with no headers and no body.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: Version::HTTP_11,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<Bytes>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the last header called `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .rev()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_ref())
    }

    fn connection_has(&self, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("connection"))
            .flat_map(|(_, value)| value.split(|b| *b == b','))
            .any(|option| option.trim_ascii().eq_ignore_ascii_case(token.as_bytes()))
    }

    /// Whether the connection should stay open after this request
    pub fn keep_alive(&self) -> bool {
        match self.version {
            Version::HTTP_10 | Version::HTTP_09 => self.connection_has("keep-alive"),
            _ => !self.connection_has("close"),
        }
    }

    /// HEAD responses carry headers only
    pub fn is_head(&self) -> bool {
        self.method == "HEAD"
    }

    /// Whether the client waits for `100 Continue` before sending the body
    pub fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|value| value.trim_ascii().eq_ignore_ascii_case(b"100-continue"))
    }
}
