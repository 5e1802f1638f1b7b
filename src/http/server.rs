use super::codec::{CONTINUE_RESPONSE, HttpCodec, HttpError, ResponseFrame};
use super::config::HttpConfig;
use crate::common::EchoServerTrait;
use crate::echo::{EchoEncoder, JsonEncoder, Responder, ResponderConfig};
use crate::{EchoError, Result};
use bytes::BytesMut;
use http::HeaderValue;
use http::header::SERVER;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::{signal, time::timeout};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{Instrument, debug, error, info, warn};

/// HTTP echo server
///
/// Accepts connections, reads HTTP/1.x requests and answers each one with the
/// JSON echo produced by its [`Responder`]. Every connection runs in its own
/// task; the responder is shared read-only between them.
///
/// # Examples
///
/// ```no_run
/// use echo_service::common::EchoServerTrait;
/// use echo_service::echo::ResponderConfig;
/// use echo_service::http::{HttpConfig, HttpEchoServer};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = HttpConfig {
///         bind_addr: "127.0.0.1:8080".parse()?,
///         ..HttpConfig::default()
///     };
///
///     let server = HttpEchoServer::new(config, ResponderConfig::default());
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct HttpEchoServer<E = JsonEncoder> {
    config: HttpConfig,
    responder: Arc<Responder<E>>,
    shutdown_signal: Arc<broadcast::Sender<()>>,
}

impl HttpEchoServer<JsonEncoder> {
    /// Creates a server answering with the JSON encoder
    pub fn new(config: HttpConfig, responder: ResponderConfig) -> Self {
        Self::with_responder(config, Responder::new(responder))
    }
}

impl<E: EchoEncoder + 'static> HttpEchoServer<E> {
    /// Creates a server around an already-built responder
    pub fn with_responder(config: HttpConfig, responder: Responder<E>) -> Self {
        let (shutdown_signal, _) = broadcast::channel(1);
        Self {
            config,
            responder: Arc::new(responder),
            shutdown_signal: Arc::new(shutdown_signal),
        }
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Binds the listener without accepting yet
    pub async fn bind(&self) -> Result<TcpListener> {
        Ok(TcpListener::bind(self.config.bind_addr).await?)
    }

    /// Accepts connections on `listener` until Ctrl-C, SIGTERM or the shutdown signal
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_with_shutdown(listener, self.shutdown_signal.subscribe())
            .await
    }

    /// Like [`serve`](Self::serve), stopping on `shutdown_rx`.
    ///
    /// Subscribe before handing the server to another task, so a shutdown
    /// sent before the task first runs is not lost.
    pub async fn serve_with_shutdown(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        info!(address = %listener.local_addr()?, "HTTP echo server listening");

        let connection_count = Arc::new(AtomicUsize::new(0));
        let termination = termination();
        tokio::pin!(termination);

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, addr)) => {
                            let current_count = connection_count.load(Ordering::SeqCst);
                            if current_count >= self.config.max_connections {
                                warn!(%addr, current = current_count, limit = self.config.max_connections, "Connection rejected: limit reached");
                                continue;
                            }

                            let new_count = connection_count.fetch_add(1, Ordering::SeqCst) + 1;
                            debug!(%addr, current = new_count, "Accepted connection");

                            let config = self.config.clone();
                            let responder = self.responder.clone();
                            let connection_count = connection_count.clone();
                            let span = tracing::info_span!("connection", peer = %addr);

                            tokio::spawn(async move {
                                let result = Self::handle_connection(stream, config, responder).instrument(span).await;
                                match result {
                                    Ok(()) => {}
                                    Err(e @ EchoError::Http(_)) => {
                                        warn!(%addr, error = %e, "Malformed or incomplete request");
                                    }
                                    Err(e) => {
                                        error!(%addr, error = %e, "Error handling connection");
                                    }
                                }
                                let final_count = connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
                                debug!(%addr, current = final_count, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = &mut termination => {
                    info!("Received shutdown signal, stopping server");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received internal shutdown signal, stopping server");
                    break;
                }
            }
        }

        info!("HTTP echo server stopped");
        Ok(())
    }

    /// Serves requests on one connection until it closes or stops being kept alive
    async fn handle_connection(
        mut stream: TcpStream,
        config: HttpConfig,
        responder: Arc<Responder<E>>,
    ) -> Result<()> {
        let mut codec = HttpCodec::new(config.buffer_size, config.max_body_size);
        let mut buffer = BytesMut::with_capacity(config.buffer_size);
        let mut output = BytesMut::new();
        let server_name = HeaderValue::from_str(&config.server_name).ok();

        loop {
            let request = loop {
                match codec.decode(&mut buffer) {
                    Ok(Some(request)) => break request,
                    Ok(None) => {}
                    Err(e) => {
                        reject(&mut stream, &mut codec, &e, config.write_timeout).await;
                        return Err(e.into());
                    }
                }

                if codec.take_continue() {
                    write_with_timeout(&mut stream, CONTINUE_RESPONSE, config.write_timeout).await?;
                }

                buffer.reserve(config.buffer_size);
                match timeout(config.read_timeout, stream.read_buf(&mut buffer)).await {
                    Ok(Ok(0)) => {
                        if codec.is_pending() || !buffer.is_empty() {
                            return Err(HttpError::IncompleteRequest.into());
                        }
                        debug!("Client closed connection");
                        return Ok(());
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => {
                        debug!("Read timeout");
                        return Ok(());
                    }
                }
            };

            let keep_alive = request.keep_alive();
            let head_only = request.is_head();
            let version = request.version;

            let mut response = responder.handle(&request).await;
            if let Some(server_name) = &server_name {
                response.headers_mut().insert(SERVER, server_name.clone());
            }
            debug!(
                method = %request.method,
                target = %request.target,
                status = response.status().as_u16(),
                "Request handled"
            );

            codec.encode(
                ResponseFrame {
                    response,
                    keep_alive,
                    head_only,
                    version,
                },
                &mut output,
            )?;
            write_with_timeout(&mut stream, &output, config.write_timeout).await?;
            output.clear();

            if !keep_alive {
                break;
            }
        }

        let _ = stream.shutdown().await;
        Ok(())
    }
}

/// How long a rejected connection is drained before it is dropped
const LINGER_TIMEOUT: Duration = Duration::from_secs(1);

/// Writes a plain error response for a framing error that has a status.
async fn reject(stream: &mut TcpStream, codec: &mut HttpCodec, err: &HttpError, limit: Duration) {
    let Some(status) = err.status() else {
        return;
    };
    debug!(error = %err, status = status.as_u16(), "Rejecting request");

    let mut output = BytesMut::new();
    if codec.encode(ResponseFrame::error(status), &mut output).is_err() {
        return;
    }
    if write_with_timeout(stream, &output, limit).await.is_err() {
        return;
    }

    // Discard unread input so closing does not reset the connection before
    // the client has read the error.
    let _ = stream.shutdown().await;
    let mut scratch = [0u8; 4096];
    let _ = timeout(LINGER_TIMEOUT, async {
        while let Ok(n) = stream.read(&mut scratch).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
}

async fn write_with_timeout(stream: &mut TcpStream, data: &[u8], limit: Duration) -> Result<()> {
    timeout(limit, async {
        stream.write_all(data).await?;
        stream.flush().await
    })
    .await
    .map_err(|_| EchoError::Timeout("write timed out".to_string()))??;
    Ok(())
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
async fn termination() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal as unix_signal};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                let _ = signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}

impl<E: EchoEncoder + 'static> EchoServerTrait for HttpEchoServer<E> {
    /// Binds the configured address and serves until shutdown
    async fn run(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> broadcast::Sender<()> {
        self.shutdown_signal.as_ref().clone()
    }
}
