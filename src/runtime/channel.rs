//! Channel driver: one connection and the handler attached to it.
//!
//! The driver owns the read loop. Each chunk read from the socket is handed
//! to the handler's `channel_read`, and anything the handler wrote into its
//! [`ChannelContext`] is flushed before the next read. I/O errors are
//! terminal: the handler is notified, the stream is shut down and the error
//! is returned to the caller.

use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Callbacks for connection lifecycle and data events.
pub trait Handler: Send {
    /// The connection is established and ready for writes.
    fn channel_active(&mut self, _ctx: &mut ChannelContext) {}

    /// Bytes arrived from the peer.
    fn channel_read(&mut self, ctx: &mut ChannelContext, msg: Bytes);

    /// An I/O error ended the connection.
    fn exception_caught(&mut self, ctx: &mut ChannelContext, error: &io::Error) {
        warn!(peer = %ctx.peer_addr(), error = %error, "Channel error");
        ctx.close();
    }

    /// The connection is finished; no further callbacks follow.
    fn channel_inactive(&mut self, _ctx: &ChannelContext) {}
}

/// Per-connection state visible to a handler.
#[derive(Debug)]
pub struct ChannelContext {
    peer: SocketAddr,
    outbound: BytesMut,
    closing: bool,
}

impl ChannelContext {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            outbound: BytesMut::new(),
            closing: false,
        }
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Queue bytes to send. Flushed once the current callback returns.
    pub fn write(&mut self, data: &[u8]) {
        self.outbound.extend_from_slice(data);
    }

    /// Close the channel after pending writes are flushed.
    pub fn close(&mut self) {
        self.closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }
}

/// Tunables for a single channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    pub read_buffer_size: usize,
    /// Close the channel when nothing is read for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: BUFFER_SIZE,
            idle_timeout: None,
        }
    }
}

/// Byte counters for a finished channel.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub bytes_read: usize,
    pub bytes_written: usize,
}

/// Drive `handler` over `stream` until the channel closes.
pub async fn drive<S, H>(
    mut stream: S,
    peer: SocketAddr,
    handler: &mut H,
    options: ChannelOptions,
) -> io::Result<ChannelStats>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler + ?Sized,
{
    let mut ctx = ChannelContext::new(peer);
    let mut stats = ChannelStats::default();

    let outcome = pump(&mut stream, handler, &mut ctx, &options, &mut stats).await;

    if let Err(ref e) = outcome {
        handler.exception_caught(&mut ctx, e);
        // Best effort: the stream is already broken in most cases.
        let _ = flush(&mut stream, &mut ctx, &mut stats).await;
    }

    let _ = stream.shutdown().await;
    handler.channel_inactive(&ctx);
    trace!(peer = %peer, ?stats, "Channel closed");

    outcome.map(|()| stats)
}

async fn pump<S, H>(
    stream: &mut S,
    handler: &mut H,
    ctx: &mut ChannelContext,
    options: &ChannelOptions,
    stats: &mut ChannelStats,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler + ?Sized,
{
    let mut buffer = BytesMut::with_capacity(options.read_buffer_size);

    handler.channel_active(ctx);
    flush(stream, ctx, stats).await?;

    while !ctx.is_closing() {
        buffer.reserve(options.read_buffer_size);

        let n = match options.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, stream.read_buf(&mut buffer)).await {
                Ok(result) => result?,
                Err(_) => {
                    debug!(peer = %ctx.peer_addr(), idle_ms = idle.as_millis() as u64, "Channel idle, closing");
                    return Ok(());
                }
            },
            None => stream.read_buf(&mut buffer).await?,
        };

        if n == 0 {
            trace!(peer = %ctx.peer_addr(), "Connection closed by peer");
            return Ok(());
        }
        stats.bytes_read += n;

        handler.channel_read(ctx, buffer.split().freeze());
        flush(stream, ctx, stats).await?;
    }

    Ok(())
}

async fn flush<S>(stream: &mut S, ctx: &mut ChannelContext, stats: &mut ChannelStats) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    if ctx.outbound.is_empty() {
        return Ok(());
    }

    let data = ctx.outbound.split();
    stream.write_all(&data).await?;
    stream.flush().await?;
    stats.bytes_written += data.len();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// Records every callback it sees.
    #[derive(Default)]
    struct Recorder {
        greeting: Option<&'static [u8]>,
        echo: bool,
        close_after_first: bool,
        events: Vec<String>,
    }

    impl Handler for Recorder {
        fn channel_active(&mut self, ctx: &mut ChannelContext) {
            self.events.push("active".into());
            if let Some(greeting) = self.greeting {
                ctx.write(greeting);
            }
        }

        fn channel_read(&mut self, ctx: &mut ChannelContext, msg: Bytes) {
            self.events
                .push(format!("read {}", String::from_utf8_lossy(&msg)));
            if self.echo {
                ctx.write(&msg);
            }
            if self.close_after_first {
                ctx.close();
            }
        }

        fn exception_caught(&mut self, ctx: &mut ChannelContext, error: &io::Error) {
            self.events.push(format!("error {:?}", error.kind()));
            ctx.close();
        }

        fn channel_inactive(&mut self, _ctx: &ChannelContext) {
            self.events.push("inactive".into());
        }
    }

    #[tokio::test]
    async fn test_greeting_written_on_active() {
        let stream = Builder::new().write(b"Hello Server").build();
        let mut handler = Recorder {
            greeting: Some(b"Hello Server"),
            ..Default::default()
        };

        let stats = drive(stream, peer(), &mut handler, ChannelOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.bytes_written, 12);
        assert_eq!(stats.bytes_read, 0);
        assert_eq!(handler.events, vec!["active", "inactive"]);
    }

    #[tokio::test]
    async fn test_reads_are_echoed() {
        let stream = Builder::new()
            .read(b"ping")
            .write(b"ping")
            .read(b"pong")
            .write(b"pong")
            .build();
        let mut handler = Recorder {
            echo: true,
            ..Default::default()
        };

        let stats = drive(stream, peer(), &mut handler, ChannelOptions::default())
            .await
            .unwrap();

        assert_eq!(stats, ChannelStats { bytes_read: 8, bytes_written: 8 });
        assert_eq!(
            handler.events,
            vec!["active", "read ping", "read pong", "inactive"]
        );
    }

    #[tokio::test]
    async fn test_handler_close_stops_reading() {
        let stream = Builder::new().read(b"first").build();
        let mut handler = Recorder {
            close_after_first: true,
            ..Default::default()
        };

        let stats = drive(stream, peer(), &mut handler, ChannelOptions::default())
            .await
            .unwrap();

        assert_eq!(stats.bytes_read, 5);
        assert_eq!(handler.events, vec!["active", "read first", "inactive"]);
    }

    #[tokio::test]
    async fn test_read_error_is_terminal() {
        let stream = Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut handler = Recorder::default();

        let err = drive(stream, peer(), &mut handler, ChannelOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(
            handler.events,
            vec![
                "active",
                "read partial",
                "error ConnectionReset",
                "inactive"
            ]
        );
    }

    #[tokio::test]
    async fn test_write_error_is_terminal() {
        let stream = Builder::new()
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"))
            .build();
        let mut handler = Recorder {
            greeting: Some(b"hi"),
            ..Default::default()
        };

        let err = drive(stream, peer(), &mut handler, ChannelOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(handler.events, vec!["active", "error BrokenPipe", "inactive"]);
    }

    #[tokio::test]
    async fn test_idle_timeout_closes_channel() {
        let (client, _server) = tokio::io::duplex(64);
        let mut handler = Recorder::default();
        let options = ChannelOptions {
            idle_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };

        let stats = drive(client, peer(), &mut handler, options).await.unwrap();

        assert_eq!(stats, ChannelStats::default());
        assert_eq!(handler.events, vec!["active", "inactive"]);
    }
}
