//! Match Messages
//!
//! Inbound command payloads and outbound snapshots exchanged inside a world
//! match. Bodies are JSON; the field tags below are the wire contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::game::state::{Color, Input, OwnerKey, Position, WorldState};

// =============================================================================
// ENVELOPES
// =============================================================================

/// One inbound message of a tick batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchData {
    /// Opcode selected by the client.
    pub op_code: i64,
    /// Owner key of the sending participant.
    pub sender: OwnerKey,
    /// Raw payload.
    pub data: Vec<u8>,
}

impl MatchData {
    /// Create an inbound message.
    pub fn new(op_code: i64, sender: OwnerKey, data: impl Into<Vec<u8>>) -> Self {
        Self {
            op_code,
            sender,
            data: data.into(),
        }
    }
}

/// One outbound message delivered to a participant's connection.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchMessage {
    /// Opcode of the payload.
    pub op_code: i64,
    /// Raw payload.
    pub data: Vec<u8>,
    /// Participant the message is relayed from, if any.
    pub sender: Option<OwnerKey>,
}

// =============================================================================
// INBOUND PAYLOADS
// =============================================================================

/// `UPDATE_POSITION` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePosition {
    /// Target owner key.
    pub id: OwnerKey,
    /// New position.
    pub position: Position,
}

/// `UPDATE_INPUT` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInput {
    /// Target owner key.
    pub id: OwnerKey,
    /// New direction axis.
    pub input: f64,
}

/// `UPDATE_JUMP` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateJump {
    /// Target owner key.
    pub id: OwnerKey,
}

/// `DO_SPAWN` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoSpawn {
    /// Chosen display name.
    pub id: String,
    /// Chosen color.
    #[serde(rename = "col")]
    pub color: Color,
    /// Character name as typed by the player.
    #[serde(rename = "nm")]
    pub name: String,
}

/// `UPDATE_COLOR` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateColor {
    /// Target owner key.
    pub id: OwnerKey,
    /// New color.
    pub color: Color,
}

// =============================================================================
// OUTBOUND SNAPSHOTS
// =============================================================================

/// Full snapshot sent to a participant right after they spawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// Positions by owner key.
    #[serde(rename = "pos")]
    pub positions: BTreeMap<OwnerKey, Position>,
    /// Inputs by owner key.
    #[serde(rename = "inp")]
    pub inputs: BTreeMap<OwnerKey, Input>,
    /// Colors by owner key.
    #[serde(rename = "col")]
    pub colors: BTreeMap<OwnerKey, Color>,
    /// Display names by owner key.
    #[serde(rename = "nms")]
    pub names: BTreeMap<OwnerKey, String>,
}

impl InitialState {
    /// Capture the current world.
    pub fn from_state(state: &WorldState) -> Self {
        Self {
            positions: state.positions().clone(),
            inputs: state.inputs().clone(),
            colors: state.colors().clone(),
            names: state.names().clone(),
        }
    }

    /// Encode as a JSON payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Per-tick heartbeat snapshot broadcast to everyone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateState {
    /// Positions by owner key.
    #[serde(rename = "pos")]
    pub positions: BTreeMap<OwnerKey, Position>,
    /// Inputs by owner key.
    #[serde(rename = "inp")]
    pub inputs: BTreeMap<OwnerKey, Input>,
}

impl UpdateState {
    /// Capture the current world.
    pub fn from_state(state: &WorldState) -> Self {
        Self {
            positions: state.positions().clone(),
            inputs: state.inputs().clone(),
        }
    }

    /// Encode as a JSON payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
