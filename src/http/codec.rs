use super::request::IncomingRequest;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::{Response, StatusCode, Version};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

/// Maximum number of request headers
pub const MAX_HEADERS: usize = 64;

/// Upper bound on a chunk-size or trailer line
const MAX_CHUNK_LINE: usize = 4096;

/// Interim response sent to clients waiting on `Expect: 100-continue`
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    #[error("Request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("Invalid Content-Length header")]
    InvalidContentLength,
    #[error("Unsupported transfer encoding: {0}")]
    UnsupportedTransferEncoding(String),
    #[error("Invalid chunked body: {0}")]
    InvalidChunk(&'static str),
    #[error("Incomplete request")]
    IncompleteRequest,
}

impl HttpError {
    /// Status to answer with before closing the connection, if any
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HttpError::Io(_) | HttpError::IncompleteRequest => None,
            HttpError::HeadTooLarge(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            HttpError::BodyTooLarge(_) => Some(StatusCode::PAYLOAD_TOO_LARGE),
            HttpError::UnsupportedTransferEncoding(_) => Some(StatusCode::NOT_IMPLEMENTED),
            HttpError::HttpParse(_)
            | HttpError::InvalidContentLength
            | HttpError::InvalidChunk(_) => Some(StatusCode::BAD_REQUEST),
        }
    }
}

/// A response plus the connection facts needed to frame it
#[derive(Debug)]
pub struct ResponseFrame {
    pub response: Response<Bytes>,
    /// `false` adds `Connection: close`
    pub keep_alive: bool,
    /// Write the head only (answer to HEAD)
    pub head_only: bool,
    /// Version of the request being answered
    pub version: Version,
}

impl ResponseFrame {
    /// Plain-text error response that closes the connection
    pub fn error(status: StatusCode) -> Self {
        let reason = status.canonical_reason().unwrap_or("Error");
        let mut response = Response::new(Bytes::from(reason));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        Self {
            response,
            keep_alive: false,
            head_only: false,
            version: Version::HTTP_11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkStage {
    Size,
    Data(usize),
    DataEnd,
    Trailer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyFraming {
    Length(usize),
    Chunked(ChunkStage),
}

/// A request whose head is parsed and whose body is still arriving
#[derive(Debug)]
struct PendingRequest {
    request: IncomingRequest,
    framing: BodyFraming,
    body: BytesMut,
    continue_sent: bool,
}

/// HTTP/1.x request decoder and response encoder
///
/// Decoding is incremental: call [`Decoder::decode`] with the connection's
/// read buffer after every read until it yields a request. Bytes after the end
/// of a request stay in the buffer for the next (pipelined) request.
#[derive(Debug)]
pub struct HttpCodec {
    max_head_size: usize,
    max_body_size: usize,
    pending: Option<PendingRequest>,
}

impl HttpCodec {
    pub fn new(max_head_size: usize, max_body_size: usize) -> Self {
        Self {
            max_head_size,
            max_body_size,
            pending: None,
        }
    }

    /// Whether a request has been partially read
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns `true` exactly once for a pending request that expects
    /// `100 Continue` and has not started sending its body.
    pub fn take_continue(&mut self) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            return false;
        };
        let body_outstanding = !matches!(pending.framing, BodyFraming::Length(0));
        if pending.continue_sent || !body_outstanding || !pending.body.is_empty() {
            return false;
        }
        if !pending.request.expects_continue() {
            return false;
        }
        pending.continue_sent = true;
        true
    }

    fn parse_head(&self, buf: &mut BytesMut) -> Result<Option<PendingRequest>, HttpError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let head_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(len)) => len,
            Ok(httparse::Status::Partial) => {
                if buf.len() > self.max_head_size {
                    return Err(HttpError::HeadTooLarge(self.max_head_size));
                }
                return Ok(None);
            }
            Err(httparse::Error::TooManyHeaders) => {
                return Err(HttpError::HeadTooLarge(self.max_head_size));
            }
            Err(e) => {
                return Err(HttpError::HttpParse(format!("Failed to parse headers: {e}")));
            }
        };
        if head_len > self.max_head_size {
            return Err(HttpError::HeadTooLarge(self.max_head_size));
        }

        let request = IncomingRequest {
            method: req.method.unwrap_or_default().to_string(),
            target: req.path.unwrap_or_default().to_string(),
            version: match req.version {
                Some(0) => Version::HTTP_10,
                _ => Version::HTTP_11,
            },
            headers: req
                .headers
                .iter()
                .map(|header| (header.name.to_string(), Bytes::copy_from_slice(header.value)))
                .collect(),
            body: Bytes::new(),
        };
        let framing = self.body_framing(&request)?;

        buf.advance(head_len);
        Ok(Some(PendingRequest {
            request,
            framing,
            body: BytesMut::new(),
            continue_sent: false,
        }))
    }

    fn body_framing(&self, request: &IncomingRequest) -> Result<BodyFraming, HttpError> {
        if let Some(encoding) = request.header("transfer-encoding") {
            let encoding = String::from_utf8_lossy(encoding).to_ascii_lowercase();
            return match encoding.rsplit(',').next().map(str::trim) {
                Some("chunked") => Ok(BodyFraming::Chunked(ChunkStage::Size)),
                _ => Err(HttpError::UnsupportedTransferEncoding(encoding)),
            };
        }

        // Every Content-Length value, repeated or comma-separated, must agree.
        let mut length = None;
        for (_, value) in request
            .headers
            .iter()
            .filter(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        {
            for part in value[..].split(|b| *b == b',') {
                let parsed = parse_length(part.trim_ascii())?;
                match length {
                    Some(existing) if existing != parsed => {
                        return Err(HttpError::InvalidContentLength);
                    }
                    _ => length = Some(parsed),
                }
            }
        }
        let Some(length) = length else {
            return Ok(BodyFraming::Length(0));
        };
        if length > self.max_body_size {
            return Err(HttpError::BodyTooLarge(self.max_body_size));
        }
        Ok(BodyFraming::Length(length))
    }
}

impl PendingRequest {
    /// Moves body bytes out of `buf`; returns `true` once the body is complete.
    fn read_body(&mut self, buf: &mut BytesMut, max_body_size: usize) -> Result<bool, HttpError> {
        loop {
            match self.framing {
                BodyFraming::Length(remaining) => {
                    let n = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf[..n]);
                    buf.advance(n);
                    self.framing = BodyFraming::Length(remaining - n);
                    return Ok(remaining == n);
                }
                BodyFraming::Chunked(ChunkStage::Size) => {
                    let Some(line) = take_line(buf)? else {
                        return Ok(false);
                    };
                    let size = line[..]
                        .split(|b| *b == b';')
                        .next()
                        .and_then(|size| std::str::from_utf8(size).ok())
                        .and_then(|size| usize::from_str_radix(size.trim(), 16).ok())
                        .ok_or(HttpError::InvalidChunk("bad chunk size"))?;
                    if size == 0 {
                        self.framing = BodyFraming::Chunked(ChunkStage::Trailer);
                        continue;
                    }
                    if self.body.len().saturating_add(size) > max_body_size {
                        return Err(HttpError::BodyTooLarge(max_body_size));
                    }
                    self.framing = BodyFraming::Chunked(ChunkStage::Data(size));
                }
                BodyFraming::Chunked(ChunkStage::Data(remaining)) => {
                    if buf.is_empty() {
                        return Ok(false);
                    }
                    let n = remaining.min(buf.len());
                    self.body.extend_from_slice(&buf[..n]);
                    buf.advance(n);
                    self.framing = if n == remaining {
                        BodyFraming::Chunked(ChunkStage::DataEnd)
                    } else {
                        BodyFraming::Chunked(ChunkStage::Data(remaining - n))
                    };
                }
                BodyFraming::Chunked(ChunkStage::DataEnd) => {
                    if buf.len() < 2 {
                        return Ok(false);
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(HttpError::InvalidChunk("missing CRLF after chunk data"));
                    }
                    buf.advance(2);
                    self.framing = BodyFraming::Chunked(ChunkStage::Size);
                }
                BodyFraming::Chunked(ChunkStage::Trailer) => {
                    // Trailer fields are discarded; an empty line ends the body.
                    let Some(line) = take_line(buf)? else {
                        return Ok(false);
                    };
                    if line.is_empty() {
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn finish(self) -> IncomingRequest {
        IncomingRequest {
            body: self.body.freeze(),
            ..self.request
        }
    }
}

/// Digits only: no sign, no whitespace inside.
fn parse_length(value: &[u8]) -> Result<usize, HttpError> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(HttpError::InvalidContentLength);
    }
    std::str::from_utf8(value)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .ok_or(HttpError::InvalidContentLength)
}

/// Splits one CRLF-terminated line off the front of `buf`, without the CRLF.
fn take_line(buf: &mut BytesMut) -> Result<Option<BytesMut>, HttpError> {
    match buf.windows(2).position(|window| window == b"\r\n") {
        Some(end) => {
            let line = buf.split_to(end);
            buf.advance(2);
            Ok(Some(line))
        }
        None if buf.len() > MAX_CHUNK_LINE => Err(HttpError::InvalidChunk("line too long")),
        None => Ok(None),
    }
}

impl Decoder for HttpCodec {
    type Item = IncomingRequest;
    type Error = HttpError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.pending.is_none() {
            self.pending = self.parse_head(buf)?;
        }
        let Some(pending) = self.pending.as_mut() else {
            return Ok(None);
        };
        if !pending.read_body(buf, self.max_body_size)? {
            return Ok(None);
        }
        Ok(self.pending.take().map(PendingRequest::finish))
    }
}

impl Encoder<ResponseFrame> for HttpCodec {
    type Error = HttpError;

    fn encode(&mut self, frame: ResponseFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (parts, body) = frame.response.into_parts();

        dst.put_slice(b"HTTP/1.1 ");
        dst.put_slice(parts.status.as_str().as_bytes());
        dst.put_u8(b' ');
        dst.put_slice(parts.status.canonical_reason().unwrap_or("").as_bytes());
        dst.put_slice(b"\r\n");

        for (name, value) in &parts.headers {
            dst.put_slice(name.as_str().as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        if !parts.headers.contains_key(http::header::CONTENT_LENGTH) {
            dst.put_slice(b"content-length: ");
            dst.put_slice(body.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        if !frame.keep_alive {
            dst.put_slice(b"connection: close\r\n");
        } else if frame.version == Version::HTTP_10 {
            // HTTP/1.0 clients assume close unless told otherwise
            dst.put_slice(b"connection: keep-alive\r\n");
        }
        dst.put_slice(b"\r\n");

        if !frame.head_only {
            dst.put_slice(&body);
        }
        Ok(())
    }
}
