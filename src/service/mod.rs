//! # Service Layer
//!
//! The long-running tasks that move traffic once the gate has accepted the login.
//!
//! ## Components
//! - **Writer**: the outbound serializer, sole owner of the socket's write half
//! - **Reader**: the inbound reader, routes gate frames to the command sink
//! - **Pipeline**: queue poller and worker pool turning queue messages into frames
//! - **Sink**: destinations for events decoded from the gate
//! - **Bridge**: wires the above together for one connection

pub mod bridge;
pub mod pipeline;
pub mod reader;
pub mod sink;
pub mod writer;

pub use bridge::Bridge;
