use crate::Result;

/// Common trait for echo servers
///
/// Implemented by servers that can run to completion and be stopped from
/// another task.
#[allow(async_fn_in_trait)]
pub trait EchoServerTrait {
    /// Starts the echo server and serves until shut down
    async fn run(&self) -> Result<()>;

    /// Returns a shutdown signal sender that can be used to gracefully shutdown the server
    fn shutdown_signal(&self) -> tokio::sync::broadcast::Sender<()>;
}
