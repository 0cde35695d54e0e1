//! # Core Protocol Components
//!
//! Low-level frame handling for the gate wire protocol.
//!
//! ## Components
//! - **Packet**: outbound frame builder, finished wire frames and the inbound read cursor
//! - **Codec**: Tokio codec for framing over the TCP byte stream
//!
//! ## Wire Format
//! ```text
//! [Length(2)] [HeaderTag(4)] [Command(2)] [Payload(N)]
//! ```
//!
//! ## Limits
//! - Outbound frames are capped at 1024 bytes, length prefix included
//! - Inbound frames are bounded by the 16-bit length prefix

pub mod codec;
pub mod packet;
