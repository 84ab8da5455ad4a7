//! Event-driven networking runtime.
//!
//! - `EventLoopGroup`: a named pool of I/O threads (tokio runtime)
//! - `Handler`: per-connection callbacks for lifecycle and data events
//! - `drive`: runs one channel, feeding reads to its handler and flushing
//!   the handler's writes

mod channel;
mod event_loop;

pub use channel::{drive, ChannelContext, ChannelOptions, ChannelStats, Handler};
pub use event_loop::EventLoopGroup;
