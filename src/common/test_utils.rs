use crate::Result;
use crate::common::EchoServerTrait;
use crate::echo::{EchoEncoder, Responder};
use crate::http::{HttpConfig, HttpEchoServer};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// A server running in the background on a loopback port
pub struct TestServer {
    pub addr: SocketAddr,
    pub handle: JoinHandle<Result<()>>,
    shutdown: broadcast::Sender<()>,
}

impl TestServer {
    /// Stops accepting connections and waits for the accept loop to finish
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.handle
            .await
            .unwrap_or_else(|e| Err(crate::EchoError::Config(format!("server task failed: {e}"))))
    }
}

/// Starts an echo server on `127.0.0.1` with an OS-assigned port.
///
/// The listener is bound before this returns, so clients can connect
/// immediately.
pub async fn spawn_test_server<E>(responder: Responder<E>) -> Result<TestServer>
where
    E: EchoEncoder + 'static,
{
    let config = HttpConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        read_timeout: Duration::from_secs(5),
        write_timeout: Duration::from_secs(5),
        ..HttpConfig::default()
    };

    let server = HttpEchoServer::with_responder(config, responder);
    let listener = server.bind().await?;
    let addr = listener.local_addr()?;
    let shutdown = server.shutdown_signal();
    let shutdown_rx = shutdown.subscribe();

    let handle =
        tokio::spawn(async move { server.serve_with_shutdown(listener, shutdown_rx).await });

    Ok(TestServer {
        addr,
        handle,
        shutdown,
    })
}
