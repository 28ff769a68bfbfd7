//! Inter-process communication for airsentry components
//!
//! Uses Unix sockets for real-time snapshot streaming between:
//! - Recon daemon (server/broadcaster)
//! - Watch clients and one-shot queries (subscribers)

pub mod client;
pub mod messages;
pub mod server;

pub use client::{connect_with_retry, fetch_snapshot, IpcClient};
pub use messages::*;
pub use server::{IpcRequest, IpcServer};

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "/run/airsentry/events.sock";

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u8 = 1;
