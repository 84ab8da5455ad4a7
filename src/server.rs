//! TCP server bootstrap.
//!
//! Binds the listener, accepts connections and attaches a fresh
//! [`EchoHandler`] to each one. Runs until the shutdown future resolves.

use crate::config::ServerSettings;
use crate::handlers::EchoHandler;
use crate::runtime::{drive, ChannelOptions};
use socket2::SockRef;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Listen backlog
const BACKLOG: i32 = 1024;

/// A bound server, ready to accept connections.
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    keepalive: bool,
}

impl Server {
    /// Bind the listener described by `settings`.
    pub async fn bind(settings: &ServerSettings) -> io::Result<Self> {
        let addrs = tokio::net::lookup_host(&settings.listen).await?;
        let listener = TcpListener::from_std(create_first_listener(&settings.listen, addrs)?)?;
        let local_addr = listener.local_addr()?;

        info!(address = %local_addr, port = local_addr.port(), "Server is started");

        Ok(Server {
            listener,
            local_addr,
            keepalive: settings.keepalive,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` resolves.
    ///
    /// Returns the number of connections accepted. Connections still open at
    /// shutdown are aborted.
    pub async fn serve<F>(self, shutdown: F) -> io::Result<usize>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut connections = JoinSet::new();
        let mut accepted = 0usize;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!(accepted, open = connections.len(), "Server shutting down");
                    break;
                }
                result = self.listener.accept() => match result {
                    Ok((stream, peer)) => {
                        accepted += 1;
                        debug!(peer = %peer, "New connection");

                        if let Err(e) = configure_accepted(&stream, self.keepalive) {
                            warn!(peer = %peer, error = %e, "Failed to set socket options");
                        }

                        connections.spawn(async move {
                            let mut handler = EchoHandler::new();
                            match drive(stream, peer, &mut handler, ChannelOptions::default()).await {
                                Ok(stats) => debug!(
                                    peer = %peer,
                                    bytes_read = stats.bytes_read,
                                    bytes_written = stats.bytes_written,
                                    "Connection finished"
                                ),
                                Err(e) => debug!(peer = %peer, error = %e, "Connection error"),
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Connection task failed");
                    }
                }
            }
        }

        connections.shutdown().await;
        Ok(accepted)
    }
}

/// Apply per-connection socket options to an accepted stream.
fn configure_accepted(stream: &TcpStream, keepalive: bool) -> io::Result<()> {
    if keepalive {
        SockRef::from(stream).set_keepalive(true)?;
    }
    Ok(())
}

/// Bind the first resolved address that accepts a listener.
///
/// Resolved addresses are tried in order (e.g. `::1` then `127.0.0.1` for
/// `localhost`); the last bind error is returned if none succeed.
fn create_first_listener<I>(listen: &str, addrs: I) -> io::Result<std::net::TcpListener>
where
    I: IntoIterator<Item = SocketAddr>,
{
    let mut last_err = None;
    for addr in addrs {
        match create_listener(addr) {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(address = %addr, error = %e, "Bind failed, trying next address");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no address for {listen}"),
        )
    }))
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}
