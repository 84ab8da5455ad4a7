//! hello-tcp: a minimal TCP client/server pair
//!
//! - `server`: accepts connections and echoes whatever bytes arrive
//! - `client`: connects, sends `Hello Server` and logs the replies
//!
//! Each role runs inside its own event loop group, which is shut down on
//! every exit path. Configuration via CLI arguments or TOML file.

mod client;
mod config;
mod handlers;
mod runtime;
mod server;

use config::{ClientSettings, Config, Role, ServerSettings};
use runtime::EventLoopGroup;
use server::Server;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.role {
        Role::Server(settings) => run_server(settings, config.shutdown_timeout),
        Role::Client(settings) => run_client(settings, config.shutdown_timeout),
    }
}

/// Bind and serve until Ctrl-C.
fn run_server(
    settings: ServerSettings,
    shutdown_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(listen = %settings.listen, keepalive = settings.keepalive, "Starting server");

    let group = EventLoopGroup::new("server", settings.workers)?;
    info!(workers = group.workers(), "Event loop group ready");
    let result = group.block_on(async {
        let server = Server::bind(&settings).await?;
        server.serve(shutdown_signal()).await
    });
    group.shutdown_gracefully(shutdown_timeout);

    match result {
        Ok(accepted) => {
            info!(accepted, "Server stopped");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server failed");
            Err(e.into())
        }
    }
}

/// Connect, greet and log replies until the connection closes or Ctrl-C.
fn run_client(
    settings: ClientSettings,
    shutdown_timeout: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(connect = %settings.connect, "Starting client");

    let group = EventLoopGroup::new("client", settings.workers)?;
    info!(workers = group.workers(), "Event loop group ready");
    let result = group.block_on(async {
        tokio::select! {
            result = client::connect(&settings) => result.map(Some),
            _ = shutdown_signal() => Ok(None),
        }
    });
    group.shutdown_gracefully(shutdown_timeout);

    match result {
        Ok(Some(stats)) => {
            info!(
                bytes_read = stats.bytes_read,
                bytes_written = stats.bytes_written,
                "Client finished"
            );
            Ok(())
        }
        Ok(None) => {
            info!("Client interrupted");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Client failed");
            Err(e.into())
        }
    }
}

/// Resolves on Ctrl-C. Never resolves if the signal handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
