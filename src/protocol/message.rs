//! Queue message bodies.
//!
//! The producer JSON-encodes the envelope and then encodes the resulting text
//! once more as a JSON string, so a body looks like
//! `"{\"ActionName\":\"AcceptPlayerInGuild\",\"Payload\":{...}}"`.
//! Decoding strips that outer quoting before parsing the envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{constants, BridgeError, Result};

/// A message as handed over by the queue collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Opaque handle used to acknowledge the message
    pub receipt: String,
    /// Raw body, still quoted
    pub body: String,
}

impl QueueMessage {
    pub fn new(receipt: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            receipt: receipt.into(),
            body: body.into(),
        }
    }
}

/// The decoded `{ActionName, Payload}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEnvelope {
    #[serde(rename = "ActionName")]
    pub action_name: String,
    #[serde(rename = "Payload", default)]
    pub payload: Value,
}

impl QueueEnvelope {
    /// Unquote the body and parse the envelope.
    pub fn decode(body: &str) -> Result<Self> {
        let inner: String = serde_json::from_str(body.trim())
            .map_err(|_| BridgeError::MalformedMessage(constants::ERR_BODY_NOT_QUOTED.into()))?;
        let envelope: QueueEnvelope = serde_json::from_str(&inner)?;
        if envelope.action_name.is_empty() {
            return Err(BridgeError::MalformedMessage(
                constants::ERR_EMPTY_ACTION_NAME.into(),
            ));
        }
        Ok(envelope)
    }

    /// Produce a body in the doubly-quoted form the queue carries.
    pub fn encode(&self) -> Result<String> {
        let inner = serde_json::to_string(self)?;
        Ok(serde_json::to_string(&inner)?)
    }
}
