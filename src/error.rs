//! # Error Types
//!
//! Error handling for the gate bridge.
//!
//! This module defines every error variant that can occur while talking to the
//! gate server or processing queue messages.
//!
//! ## Error Categories
//! - **Transport errors**: connect, read and write failures on the gate connection
//! - **Protocol errors**: short frames, oversized frames, repeated garbage on the wire
//! - **Application errors**: malformed queue messages, unknown actions, out-of-range fields
//! - **Capacity errors**: writes that would push a frame over the 1024 byte cap
//!
//! None of these are shown to an end user; they are logged and counted.
//!
//! ## Example Usage
//! ```rust
//! use gate_bridge::core::packet::OutboundFrame;
//! use gate_bridge::error::{BridgeError, Result};
//! use tracing::error;
//!
//! fn login_frame(user: &str, pass: &str) -> Result<OutboundFrame> {
//!     let mut frame = OutboundFrame::new(8001);
//!     frame.write_str(user)?;
//!     frame.write_str(pass)?;
//!     Ok(frame)
//! }
//!
//! match login_frame("admin", "secret") {
//!     Ok(frame) => assert_eq!(frame.size(), 8 + 2 + 6 + 2 + 7),
//!     Err(e @ BridgeError::FrameOverflow { .. }) => error!(error = %e, "Login frame too large"),
//!     Err(e) => error!(error = %e, "Failed to build login frame"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Handshake errors
    pub const ERR_HANDSHAKE_ALREADY_RUN: &str = "Handshake already performed on this connection";

    /// Message decoding errors
    pub const ERR_BODY_NOT_QUOTED: &str = "Message body is not a quoted JSON string";
    pub const ERR_EMPTY_ACTION_NAME: &str = "ActionName is empty";

    /// Credential errors
    pub const ERR_MISSING_USERNAME: &str = "Gate username is not configured";
    pub const ERR_MISSING_PASSWORD: &str = "Gate password is not configured";

    /// Queue errors
    pub const ERR_UNKNOWN_RECEIPT: &str = "Unknown receipt handle";
    pub const ERR_LOCK_POISONED: &str = "Queue state lock poisoned";
}

/// Primary error type for all bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection attempt timed out")]
    ConnectTimeout,

    #[error("Frame too short: {0} bytes (need at least 6)")]
    FrameTooShort(usize),

    #[error("Frame would exceed {limit} bytes (attempted {attempted})")]
    FrameOverflow { attempted: usize, limit: usize },

    #[error("String contains an embedded zero byte")]
    InvalidString,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Handshake failed: {0}")]
    HandshakeError(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("Malformed queue message: {0}")]
    MalformedMessage(String),

    #[error("Field {field} out of range: {value} does not fit in 16 bits")]
    FieldOutOfRange { field: &'static str, value: i64 },

    #[error("Outbound channel closed")]
    ChannelClosed,

    #[error("Queue error: {0}")]
    QueueError(String),

    #[error("Sink error: {0}")]
    SinkError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::MalformedMessage(e.to_string())
    }
}

/// Type alias for Results using BridgeError
pub type Result<T> = std::result::Result<T, BridgeError>;
