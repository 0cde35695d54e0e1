use crate::config::CMD_CHAT_RELAY;
use crate::core::packet::InboundFrame;
use crate::error::{constants, BridgeError, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

type HandlerFn = dyn Fn(&mut InboundFrame) -> Result<Option<GateEvent>> + Send + Sync + 'static;

/// A player chat line relayed by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub character: String,
    pub channel: String,
    pub content: String,
}

impl ChatMessage {
    /// Decode `character, channel, content` from a chat relay frame.
    pub fn decode(frame: &mut InboundFrame) -> Self {
        let character = frame.read_str();
        let channel = frame.read_str();
        let content = frame.read_str();
        Self {
            character,
            channel,
            content,
        }
    }

    /// Name shown next to the relayed line, e.g. `[World] Alice`.
    pub fn display_name(&self) -> String {
        format!("[{}] {}", self.channel, self.character)
    }
}

/// Something the gate told us that an external sink should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    Chat(ChatMessage),
}

impl GateEvent {
    pub fn command(&self) -> u16 {
        match self {
            GateEvent::Chat(_) => CMD_CHAT_RELAY,
        }
    }
}

/// Routes inbound frames to handlers by command id.
///
/// Commands without a handler are not an error; `dispatch` returns `Ok(None)`
/// and the frame is dropped.
pub struct Dispatcher {
    handlers: Arc<RwLock<HashMap<u16, Box<HandlerFn>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl Dispatcher {
    /// An empty dispatcher that drops everything.
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A dispatcher with the chat relay handler registered.
    pub fn with_defaults() -> Self {
        let mut handlers: HashMap<u16, Box<HandlerFn>> = HashMap::new();
        handlers.insert(
            CMD_CHAT_RELAY,
            Box::new(|frame: &mut InboundFrame| {
                Ok(Some(GateEvent::Chat(ChatMessage::decode(frame))))
            }),
        );
        Self {
            handlers: Arc::new(RwLock::new(handlers)),
        }
    }

    pub fn register<F>(&self, command: u16, handler: F) -> Result<()>
    where
        F: Fn(&mut InboundFrame) -> Result<Option<GateEvent>> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().map_err(|_| {
            BridgeError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        handlers.insert(command, Box::new(handler));
        Ok(())
    }

    pub fn is_registered(&self, command: u16) -> bool {
        self.handlers
            .read()
            .map(|handlers| handlers.contains_key(&command))
            .unwrap_or(false)
    }

    pub fn dispatch(&self, frame: &mut InboundFrame) -> Result<Option<GateEvent>> {
        let handlers = self.handlers.read().map_err(|_| {
            BridgeError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string())
        })?;

        match handlers.get(&frame.command()) {
            Some(handler) => handler(frame),
            None => Ok(None),
        }
    }
}
