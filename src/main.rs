use color_eyre::eyre::{Result, WrapErr};
use echo_service::common::EchoServerTrait;
use echo_service::http::{HttpConfig, HttpEchoServer};
use echo_service::{ResponderConfig, ServiceConfig, logging};

use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Configuration errors abort before anything is bound
    let config = ServiceConfig::from_env().wrap_err("Invalid configuration")?;

    logging::init(config.log_level).wrap_err("Failed to initialize logging")?;

    let server = HttpEchoServer::new(HttpConfig::from(&config), ResponderConfig::from(&config));

    info!(port = %config.http_port, "Starting server");
    if let Some(delay) = config.response_delay {
        info!(delay_ms = delay.as_millis() as u64, "Response delay enabled");
    }

    server.run().await.wrap_err("error in ListenAndServe")?;

    Ok(())
}
