//! IPC message types for daemon-subscriber communication
//!
//! Wire format: [4 bytes: length (big-endian)][JSON payload]

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::SnapshotPayload;

/// Hard cap on a single frame's payload
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Protocol-level failures, distinct from transport errors
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("unexpected message during handshake")]
    UnexpectedMessage,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Message envelope with type discrimination
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IpcMessage {
    /// Handshake from client
    Hello(HelloMessage),
    /// Handshake response from server
    Welcome(WelcomeMessage),
    /// Annotated topology snapshot (pushed on every emission)
    Snapshot(SnapshotPayload),
    /// Heartbeat (keep-alive)
    Ping,
    /// Heartbeat response
    Pong,

    // === Request/Response Messages ===

    /// Request: current annotated snapshot
    GetSnapshot,
    /// Response: current annotated snapshot
    SnapshotResponse(SnapshotPayload),

    /// Error response
    Error(ErrorResponse),
}

/// Client hello message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloMessage {
    /// Protocol version
    pub version: u8,
    /// Client identifier
    pub client_id: String,
}

/// Server welcome message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeMessage {
    /// Protocol version
    pub version: u8,
    /// Server uptime in seconds
    pub uptime_secs: u64,
    /// Scan cycles completed since startup
    pub cycles_completed: u64,
    /// Subscribers connected before this one
    pub subscribers: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl IpcMessage {
    /// Serialize to wire format: [4-byte length][JSON]
    pub fn to_wire(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        let len = json.len() as u32;
        let mut wire = Vec::with_capacity(4 + json.len());
        wire.extend_from_slice(&len.to_be_bytes());
        wire.extend(json);
        Ok(wire)
    }

    /// Deserialize from JSON bytes (without length prefix)
    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}
