//! Registry of queue actions the bridge can forward to the gate.
//!
//! Each [`Action`] pairs a symbolic name with a gate command id and a fixed
//! payload schema: an ordered list of integer fields, each written to the
//! frame as a big-endian `u16`. The registry is built once and shared
//! read-only, so lookups need no locking.
//!
//! Identifier fields arrive as JSON numbers that may be wider than 16 bits.
//! They are range-checked rather than wrapped: a value outside `0..=65535`
//! fails with [`BridgeError::FieldOutOfRange`] and the frame is never built.
//! Producers that serialize every number as a float (`5.0`) are accepted as
//! long as the value is whole; `5.5` is malformed.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

use crate::core::packet::{OutboundFrame, WireFrame};
use crate::error::{BridgeError, Result};

/// Command id for `AcceptPlayerInGuild`
pub const CMD_ACCEPT_PLAYER_IN_GUILD: u16 = 8010;

/// Command id for `RejectPlayerFromGuild`
pub const CMD_REJECT_PLAYER_FROM_GUILD: u16 = 8011;

/// A typed action payload with a fixed field order on the wire.
pub trait ActionPayload: DeserializeOwned {
    /// Field names in wire order
    const FIELDS: &'static [&'static str];

    /// Append every field to the frame, in [`Self::FIELDS`] order.
    fn write_fields(&self, frame: &mut OutboundFrame) -> Result<()>;
}

/// Narrow an identifier to the 16-bit wire field.
pub fn narrow(field: &'static str, value: i64) -> Result<u16> {
    u16::try_from(value).map_err(|_| BridgeError::FieldOutOfRange { field, value })
}

/// Accept an integer, or a float holding a whole number.
fn whole_number<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(v) = number.as_i64() {
        return Ok(v);
    }
    if number.is_u64() {
        return Ok(i64::MAX);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => Ok(f as i64),
        _ => Err(de::Error::invalid_value(
            de::Unexpected::Other(&number.to_string()),
            &"a whole number",
        )),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AcceptPlayerInGuild {
    #[serde(deserialize_with = "whole_number")]
    pub accepter_char_id: i64,
    #[serde(deserialize_with = "whole_number")]
    pub applier_char_id: i64,
    #[serde(deserialize_with = "whole_number")]
    pub guild_id: i64,
}

impl ActionPayload for AcceptPlayerInGuild {
    const FIELDS: &'static [&'static str] = &["AccepterCharId", "ApplierCharId", "GuildId"];

    fn write_fields(&self, frame: &mut OutboundFrame) -> Result<()> {
        frame.write_u16(narrow("AccepterCharId", self.accepter_char_id)?)?;
        frame.write_u16(narrow("ApplierCharId", self.applier_char_id)?)?;
        frame.write_u16(narrow("GuildId", self.guild_id)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RejectPlayerFromGuild {
    #[serde(deserialize_with = "whole_number")]
    pub rejecter_char_id: i64,
    #[serde(deserialize_with = "whole_number")]
    pub applier_char_id: i64,
    #[serde(deserialize_with = "whole_number")]
    pub guild_id: i64,
}

impl ActionPayload for RejectPlayerFromGuild {
    const FIELDS: &'static [&'static str] = &["RejecterCharId", "ApplierCharId", "GuildId"];

    fn write_fields(&self, frame: &mut OutboundFrame) -> Result<()> {
        frame.write_u16(narrow("RejecterCharId", self.rejecter_char_id)?)?;
        frame.write_u16(narrow("ApplierCharId", self.applier_char_id)?)?;
        frame.write_u16(narrow("GuildId", self.guild_id)?)
    }
}

type EncodeFn = fn(u16, &Value) -> Result<OutboundFrame>;

fn encode_with<P: ActionPayload>(command: u16, payload: &Value) -> Result<OutboundFrame> {
    let data = P::deserialize(payload)?;
    let mut frame = OutboundFrame::new(command);
    data.write_fields(&mut frame)?;
    Ok(frame)
}

/// A named operation translatable into exactly one outbound frame.
#[derive(Clone, Copy)]
pub struct Action {
    name: &'static str,
    command: u16,
    fields: &'static [&'static str],
    encode: EncodeFn,
}

impl Action {
    /// Declare an action whose payload is decoded as `P`.
    pub fn new<P: ActionPayload>(name: &'static str, command: u16) -> Self {
        Self {
            name,
            command,
            fields: P::FIELDS,
            encode: encode_with::<P>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn command(&self) -> u16 {
        self.command
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    /// Decode the untyped payload and build the wire frame.
    pub fn encode(&self, payload: &Value) -> Result<WireFrame> {
        (self.encode)(self.command, payload).map(OutboundFrame::build)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Immutable name → action lookup.
#[derive(Debug, Clone)]
pub struct ActionRegistry {
    actions: HashMap<&'static str, Action>,
}

impl ActionRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new<I>(actions: I) -> Result<Self>
    where
        I: IntoIterator<Item = Action>,
    {
        let mut map = HashMap::new();
        for action in actions {
            if map.insert(action.name, action).is_some() {
                return Err(BridgeError::ConfigError(format!(
                    "Duplicate action name: {}",
                    action.name
                )));
            }
        }
        Ok(Self { actions: map })
    }

    /// The actions the gate server currently understands.
    pub fn standard() -> Self {
        let actions = [
            Action::new::<AcceptPlayerInGuild>("AcceptPlayerInGuild", CMD_ACCEPT_PLAYER_IN_GUILD),
            Action::new::<RejectPlayerFromGuild>(
                "RejectPlayerFromGuild",
                CMD_REJECT_PLAYER_FROM_GUILD,
            ),
        ];
        Self {
            actions: actions.into_iter().map(|a| (a.name, a)).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Action> {
        self.actions.get(name)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
