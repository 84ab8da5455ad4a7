//! Client-side handler.
//!
//! Writes [`GREETING`] as soon as the connection is up, then logs every
//! chunk the server sends back as UTF-8 text.

use bytes::Bytes;
use std::io;
use tracing::{debug, error, info};

use crate::runtime::{ChannelContext, Handler};

/// First message sent on every client connection.
pub const GREETING: &[u8] = b"Hello Server";

#[derive(Debug, Default)]
pub struct ClientHandler {
    received: usize,
}

impl ClientHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes received from the server so far.
    pub fn received(&self) -> usize {
        self.received
    }
}

impl Handler for ClientHandler {
    fn channel_active(&mut self, ctx: &mut ChannelContext) {
        debug!(peer = %ctx.peer_addr(), "Sending greeting");
        ctx.write(GREETING);
    }

    fn channel_read(&mut self, ctx: &mut ChannelContext, msg: Bytes) {
        self.received += msg.len();
        info!(
            peer = %ctx.peer_addr(),
            msg = %String::from_utf8_lossy(&msg),
            "Client receive msg"
        );
    }

    fn exception_caught(&mut self, ctx: &mut ChannelContext, error: &io::Error) {
        error!(peer = %ctx.peer_addr(), error = %error, "Client channel error");
        ctx.close();
    }
}
