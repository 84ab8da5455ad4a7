//! Channel handlers.
//!
//! - `client`: sends the greeting and logs replies
//! - `echo`: server side, writes every received chunk back

pub mod client;
pub mod echo;

pub use client::ClientHandler;
pub use echo::EchoHandler;
