//! # Transport Layer
//!
//! The two external connections the bridge holds.
//!
//! ## Components
//! - **TCP**: the single persistent connection to the gate server
//! - **Queue**: the message queue boundary and an in-memory implementation

pub mod queue;
pub mod tcp;

pub use queue::{LocalQueue, MessageQueue};
