//! # Protocol Layer
//!
//! Application-level pieces of the gate protocol that sit above raw framing.
//!
//! ## Components
//! - **Action**: registry mapping queue action names to gate commands and payload schemas
//! - **Message**: queue message bodies and their `{ActionName, Payload}` envelope
//! - **Handshake**: the login exchange that must finish before any other traffic
//! - **Dispatcher**: routes inbound frames to handlers by command id

pub mod action;
pub mod dispatcher;
pub mod handshake;
pub mod message;

#[cfg(test)]
mod tests;
