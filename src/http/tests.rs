use super::codec::{CONTINUE_RESPONSE, HttpCodec, HttpError, ResponseFrame};
use super::config::HttpConfig;
use super::request::IncomingRequest;
use super::server::HttpEchoServer;
use crate::echo::ResponderConfig;
use bytes::{Bytes, BytesMut};
use http::{Response, StatusCode, Version};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder};

fn codec() -> HttpCodec {
    HttpCodec::new(8192, 1024)
}

fn decode_all(input: &[u8]) -> Result<Option<IncomingRequest>, HttpError> {
    let mut buf = BytesMut::from(input);
    codec().decode(&mut buf)
}

#[test]
fn decodes_request_without_body() {
    let request = decode_all(b"GET /foobar?aaa=bbb HTTP/1.1\r\nHost: localhost\r\nFoo: Bar\r\n\r\n")
        .unwrap()
        .unwrap();

    assert_eq!(request.method, "GET");
    assert_eq!(request.target, "/foobar?aaa=bbb");
    assert_eq!(request.version, Version::HTTP_11);
    assert_eq!(
        request.headers,
        vec![
            ("Host".to_string(), Bytes::from_static(b"localhost")),
            ("Foo".to_string(), Bytes::from_static(b"Bar")),
        ]
    );
    assert!(request.body.is_empty());
}

#[test]
fn decodes_content_length_body_across_reads() {
    let mut codec = codec();
    let mut buf = BytesMut::from(&b"POST /foobar HTTP/1.1\r\nContent-Length: 15\r\n\r\nmy req"[..]);

    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(codec.is_pending());

    buf.extend_from_slice(b"uest body");
    let request = codec.decode(&mut buf).unwrap().unwrap();

    assert_eq!(request.body, Bytes::from_static(b"my request body"));
    assert!(buf.is_empty());
    assert!(!codec.is_pending());
}

#[test]
fn partial_head_waits_for_more_data() {
    let mut codec = codec();
    let mut buf = BytesMut::from(&b"GET /x HTTP/1.1\r\nHo"[..]);

    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(!codec.is_pending());

    buf.extend_from_slice(b"st: a\r\n\r\n");
    assert!(codec.decode(&mut buf).unwrap().is_some());
}

#[test]
fn decodes_chunked_body_and_drops_trailers() {
    let mut codec = codec();
    let mut buf = BytesMut::from(
        &b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n wor"[..],
    );
    assert!(codec.decode(&mut buf).unwrap().is_none());

    buf.extend_from_slice(b"ld\r\n0\r\nX-Trailer: yes\r\n\r\nGET /next HTTP/1.1\r\n\r\n");
    let request = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(request.body, Bytes::from_static(b"hello world"));

    let next = codec.decode(&mut buf).unwrap().unwrap();
    assert_eq!(next.target, "/next");
}

#[test]
fn pipelined_requests_decode_in_order() {
    let mut codec = codec();
    let mut buf = BytesMut::from(
        &b"POST /a HTTP/1.1\r\nContent-Length: 2\r\n\r\nhiGET /b HTTP/1.1\r\n\r\n"[..],
    );

    let first = codec.decode(&mut buf).unwrap().unwrap();
    let second = codec.decode(&mut buf).unwrap().unwrap();

    assert_eq!((first.target.as_str(), first.body.as_ref()), ("/a", &b"hi"[..]));
    assert_eq!(second.target, "/b");
    assert!(codec.decode(&mut buf).unwrap().is_none());
}

#[test]
fn rejects_malformed_and_oversized_requests() {
    let err = decode_all(b"GET /x HTTP/1.1\r\nBad Header\r\n\r\n").unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: ten\r\n\r\n").unwrap_err();
    assert!(matches!(err, HttpError::InvalidContentLength));

    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: 4096\r\n\r\n").unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::PAYLOAD_TOO_LARGE));

    let err = decode_all(b"POST /x HTTP/1.1\r\nTransfer-Encoding: gzip\r\n\r\n").unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_IMPLEMENTED));

    let err = decode_all(b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n").unwrap_err();
    assert!(matches!(err, HttpError::InvalidChunk(_)));

    let mut head = b"GET /x HTTP/1.1\r\nX-Long: ".to_vec();
    head.extend(std::iter::repeat_n(b'a', 9000));
    let err = decode_all(&head).unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE));
}

#[test]
fn chunked_body_respects_size_limit() {
    let err = decode_all(b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n800\r\n").unwrap_err();
    assert!(matches!(err, HttpError::BodyTooLarge(1024)));
}

#[test]
fn continue_is_requested_once_before_the_body() {
    let mut codec = codec();
    let mut buf = BytesMut::from(
        &b"PUT /x HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 3\r\n\r\n"[..],
    );

    assert!(codec.decode(&mut buf).unwrap().is_none());
    assert!(codec.take_continue());
    assert!(!codec.take_continue());

    buf.extend_from_slice(b"abc");
    assert_eq!(codec.decode(&mut buf).unwrap().unwrap().body, Bytes::from_static(b"abc"));
}

#[test]
fn keep_alive_follows_version_and_connection_header() {
    let request = IncomingRequest::new("GET", "/");
    assert!(request.keep_alive());
    assert!(!request.clone().with_header("Connection", "close").keep_alive());

    let mut old = IncomingRequest::new("GET", "/");
    old.version = Version::HTTP_10;
    assert!(!old.keep_alive());
    assert!(old.with_header("connection", "Keep-Alive").keep_alive());
}

#[test]
fn encodes_response_with_length_and_connection() {
    let mut response = Response::new(Bytes::from_static(b"{}"));
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );

    let mut out = BytesMut::new();
    codec()
        .encode(
            ResponseFrame {
                response,
                keep_alive: false,
                head_only: false,
                version: Version::HTTP_11,
            },
            &mut out,
        )
        .unwrap();

    assert_eq!(
        &out[..],
        &b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}"[..]
    );
}

#[test]
fn head_only_frames_omit_the_body() {
    let mut out = BytesMut::new();
    codec()
        .encode(
            ResponseFrame {
                response: Response::new(Bytes::from_static(b"hello")),
                keep_alive: true,
                head_only: true,
                version: Version::HTTP_11,
            },
            &mut out,
        )
        .unwrap();

    assert_eq!(&out[..], &b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\n"[..]);
}

#[test]
fn http10_keep_alive_is_acknowledged() {
    let mut out = BytesMut::new();
    codec()
        .encode(
            ResponseFrame {
                response: Response::new(Bytes::from_static(b"{}")),
                keep_alive: true,
                head_only: false,
                version: Version::HTTP_10,
            },
            &mut out,
        )
        .unwrap();

    assert_eq!(
        &out[..],
        &b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: keep-alive\r\n\r\n{}"[..]
    );
}

#[test]
fn conflicting_or_signed_content_length_is_rejected() {
    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 5\r\n\r\n")
        .unwrap_err();
    assert!(matches!(err, HttpError::InvalidContentLength));
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));

    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: 3, 5\r\n\r\n").unwrap_err();
    assert!(matches!(err, HttpError::InvalidContentLength));

    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: +5\r\n\r\nhello").unwrap_err();
    assert!(matches!(err, HttpError::InvalidContentLength));

    let err = decode_all(b"POST /x HTTP/1.1\r\nContent-Length: -1\r\n\r\n").unwrap_err();
    assert!(matches!(err, HttpError::InvalidContentLength));
}

#[test]
fn repeated_matching_content_length_is_accepted() {
    let request =
        decode_all(b"POST /x HTTP/1.1\r\nContent-Length: 2\r\nContent-Length: 2\r\n\r\nhi")
            .unwrap()
            .unwrap();
    assert_eq!(request.body, Bytes::from_static(b"hi"));
}

async fn start_server() -> (tokio::sync::broadcast::Sender<()>, std::net::SocketAddr) {
    use crate::common::EchoServerTrait;

    let config = HttpConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        ..HttpConfig::default()
    };
    let server = HttpEchoServer::new(config, ResponderConfig::default());
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = server.shutdown_signal();
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move { server.serve_with_shutdown(listener, shutdown_rx).await });
    (shutdown, addr)
}

async fn read_until_close(stream: &mut TcpStream) -> String {
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn server_answers_and_closes_on_connection_close() {
    let (shutdown, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /foobar HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("content-type: application/json\r\n"));
    assert!(response.contains("server: echo-service\r\n"));
    assert!(response.ends_with(
        r#"{"request":{"headers":{"Connection":"close","Host":"localhost"},"query":{},"path":"/foobar","method":"GET"}}"#
    ));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn server_sends_interim_continue() {
    let (shutdown, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"POST /up HTTP/1.1\r\nExpect: 100-continue\r\nContent-Length: 4\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();

    let mut interim = vec![0u8; CONTINUE_RESPONSE.len()];
    client.read_exact(&mut interim).await.unwrap();
    assert_eq!(interim, CONTINUE_RESPONSE);

    client.write_all(b"data").await.unwrap();
    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains(r#""body":"data""#));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn server_rejects_bad_request_with_400() {
    let (shutdown, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /x HTTP/1.1\r\nContent-Length: nope\r\n\r\n")
        .await
        .unwrap();

    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 400 Bad Request\r\n"));
    assert!(response.contains("connection: close\r\n"));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn server_keeps_http10_connection_alive_when_asked() {
    let (shutdown, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"GET /a HTTP/1.0\r\nConnection: keep-alive\r\n\r\n")
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        client.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&head).into_owned();
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("connection: keep-alive\r\n"));

    let length: usize = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length: "))
        .unwrap()
        .parse()
        .unwrap();
    let mut body = vec![0u8; length];
    client.read_exact(&mut body).await.unwrap();

    // The same connection serves a second request.
    client
        .write_all(b"GET /b HTTP/1.0\r\n\r\n")
        .await
        .unwrap();
    let response = read_until_close(&mut client).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("connection: close\r\n"));
    assert!(response.contains(r#""path":"/b""#));

    let _ = shutdown.send(());
}

#[tokio::test]
async fn server_closes_silently_on_truncated_request() {
    let (shutdown, addr) = start_server().await;

    let mut client = TcpStream::connect(addr).await.unwrap();
    client
        .write_all(b"POST /x HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    client.shutdown().await.unwrap();

    let response = tokio::time::timeout(Duration::from_secs(3), read_until_close(&mut client))
        .await
        .unwrap();
    assert!(response.is_empty());

    let _ = shutdown.send(());
}
