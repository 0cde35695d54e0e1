//! # Gate Bridge
//!
//! Forwards actions from a message queue to a game gate server, and relays
//! what the gate says back to an external sink.
//!
//! The gate speaks a length-prefixed binary protocol over a single persistent
//! TCP connection:
//!
//! ```text
//! [Length(2)] [HeaderTag(4) = 0x80000000] [Command(2)] [Payload(N)]
//! ```
//!
//! After connecting, the bridge logs in and waits for the gate's verdict.
//! Once accepted it polls the queue, encodes each `{ActionName, Payload}`
//! message into the matching gate command and writes it through a single
//! serializer task. Messages are acknowledged only after their frame has
//! been queued for the socket.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use gate_bridge::config::BridgeConfig;
//! use gate_bridge::service::sink::LogSink;
//! use gate_bridge::service::Bridge;
//! use gate_bridge::transport::LocalQueue;
//!
//! # async fn run() -> gate_bridge::error::Result<()> {
//! let config = BridgeConfig::from_env()?;
//! let queue = Arc::new(LocalQueue::default());
//! queue.push(r#""{\"ActionName\":\"AcceptPlayerInGuild\",\"Payload\":{\"AccepterCharId\":5,\"ApplierCharId\":9,\"GuildId\":2}}""#)?;
//!
//! Bridge::new(config, queue, Arc::new(LogSink)).run().await
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use protocol::action::{Action, ActionRegistry};
pub use service::Bridge;
