//! Server-side echo handler.
//!
//! Every chunk read from the client is logged as UTF-8 text and written
//! back unchanged. No framing: chunk boundaries are whatever the socket
//! delivered.

use bytes::Bytes;
use std::io;
use tracing::{debug, info, warn};

use crate::runtime::{ChannelContext, Handler};

#[derive(Debug, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Handler for EchoHandler {
    fn channel_active(&mut self, ctx: &mut ChannelContext) {
        debug!(peer = %ctx.peer_addr(), "Client connected");
    }

    fn channel_read(&mut self, ctx: &mut ChannelContext, msg: Bytes) {
        info!(
            peer = %ctx.peer_addr(),
            msg = %String::from_utf8_lossy(&msg),
            "Server receive msg"
        );
        ctx.write(&msg);
    }

    fn exception_caught(&mut self, ctx: &mut ChannelContext, error: &io::Error) {
        warn!(peer = %ctx.peer_addr(), error = %error, "Server channel error");
        ctx.close();
    }

    fn channel_inactive(&mut self, ctx: &ChannelContext) {
        debug!(peer = %ctx.peer_addr(), "Client disconnected");
    }
}
