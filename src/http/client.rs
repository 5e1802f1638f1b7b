use super::codec::HttpError;
use crate::echo::EchoResponse;
use crate::{EchoError, Result};
use bytes::{Buf, Bytes, BytesMut};
use http::StatusCode;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One response read back from the server
#[derive(Debug, Clone)]
pub struct EchoReply {
    pub status: StatusCode,
    /// Header name/value pairs in the order received
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl EchoReply {
    /// Value of the first header called `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Decodes the body as an echo document
    pub fn echo(&self) -> Result<EchoResponse> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Minimal HTTP/1.1 client for talking to an echo server
///
/// Keeps one connection open across requests. Responses are framed by
/// `Content-Length`, which is all the echo server emits.
///
/// # Examples
///
/// ```no_run
/// use echo_service::http::HttpEchoClient;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let addr = "127.0.0.1:8080".parse()?;
///     let mut client = HttpEchoClient::connect(addr).await?;
///
///     let reply = client.request("GET", "/foobar?aaa=bbb", &[("Foo", "Bar")], b"").await?;
///     println!("Server saw path {}", reply.echo()?.request.path);
///     Ok(())
/// }
/// ```
pub struct HttpEchoClient {
    stream: TcpStream,
    addr: SocketAddr,
    buffer: BytesMut,
    read_timeout: Duration,
}

impl HttpEchoClient {
    /// Connects to the server at `addr`
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = timeout(Duration::from_secs(10), TcpStream::connect(addr))
            .await
            .map_err(|_| EchoError::Timeout(format!("connect to {addr} timed out")))??;
        Ok(Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(8192),
            read_timeout: Duration::from_secs(30),
        })
    }

    /// Sends a request with a `Host` header, the given headers and, for a
    /// non-empty body, a `Content-Length` header.
    pub async fn request(
        &mut self,
        method: &str,
        target: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<EchoReply> {
        let mut raw = format!("{method} {target} HTTP/1.1\r\nHost: {}\r\n", self.addr);
        for (name, value) in headers {
            raw.push_str(&format!("{name}: {value}\r\n"));
        }
        if !body.is_empty() {
            raw.push_str(&format!("Content-Length: {}\r\n", body.len()));
        }
        raw.push_str("\r\n");

        let mut bytes = raw.into_bytes();
        bytes.extend_from_slice(body);
        self.send_raw(&bytes, method != "HEAD").await
    }

    /// Writes `raw` verbatim and reads one final (non-1xx) response.
    pub async fn send_raw(&mut self, raw: &[u8], expect_body: bool) -> Result<EchoReply> {
        self.stream.write_all(raw).await?;
        self.stream.flush().await?;

        loop {
            let reply = self.read_response(expect_body).await?;
            if !reply.status.is_informational() {
                return Ok(reply);
            }
        }
    }

    async fn read_response(&mut self, expect_body: bool) -> Result<EchoReply> {
        let (status, headers, head_len) = loop {
            let mut slots = [httparse::EMPTY_HEADER; 64];
            let mut response = httparse::Response::new(&mut slots);
            match response.parse(&self.buffer) {
                Ok(httparse::Status::Complete(head_len)) => {
                    let status = StatusCode::from_u16(response.code.unwrap_or(0))
                        .map_err(|e| HttpError::HttpParse(format!("invalid status: {e}")))?;
                    let headers = response
                        .headers
                        .iter()
                        .map(|h| (h.name.to_string(), String::from_utf8_lossy(h.value).into_owned()))
                        .collect::<Vec<_>>();
                    break (status, headers, head_len);
                }
                Ok(httparse::Status::Partial) => self.fill().await?,
                Err(e) => {
                    return Err(HttpError::HttpParse(format!("invalid response: {e}")).into());
                }
            }
        };
        self.buffer.advance(head_len);

        let mut reply = EchoReply {
            status,
            headers,
            body: Bytes::new(),
        };
        if !expect_body || status.is_informational() {
            return Ok(reply);
        }

        let length = reply
            .header("content-length")
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while self.buffer.len() < length {
            self.fill().await?;
        }
        reply.body = self.buffer.split_to(length).freeze();
        Ok(reply)
    }

    async fn fill(&mut self) -> Result<()> {
        self.buffer.reserve(4096);
        let n = timeout(self.read_timeout, self.stream.read_buf(&mut self.buffer))
            .await
            .map_err(|_| EchoError::Timeout("read timed out".to_string()))??;
        if n == 0 {
            return Err(EchoError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed connection",
            )));
        }
        Ok(())
    }
}
