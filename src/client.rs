//! TCP client bootstrap.
//!
//! Connects to the configured server and runs a [`ClientHandler`] on the
//! connection until it closes.

use crate::config::ClientSettings;
use crate::handlers::ClientHandler;
use crate::runtime::{drive, ChannelOptions, ChannelStats};
use std::io;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Connect, greet the server and log replies until the channel closes.
pub async fn connect(settings: &ClientSettings) -> io::Result<ChannelStats> {
    let stream = tokio::time::timeout(settings.connect_timeout, TcpStream::connect(&settings.connect))
        .await
        .map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {} timed out", settings.connect),
            )
        })??;

    stream.set_nodelay(settings.nodelay)?;
    let peer = stream.peer_addr()?;
    info!(peer = %peer, nodelay = settings.nodelay, "Connected");

    let options = ChannelOptions {
        idle_timeout: settings.idle_timeout,
        ..Default::default()
    };

    let mut handler = ClientHandler::new();
    let stats = drive(stream, peer, &mut handler, options).await?;
    debug!(
        peer = %peer,
        bytes_read = stats.bytes_read,
        bytes_written = stats.bytes_written,
        received = handler.received(),
        "Connection closed"
    );

    Ok(stats)
}
