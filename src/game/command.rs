//! Command Handling
//!
//! Maps inbound opcodes to the reducer that applies them to the world.
//! Reducers are synchronous: decode the body, mutate one entry, return.

use std::fmt;

use thiserror::Error;

use crate::game::messages::{DoSpawn, MatchData, UpdateColor, UpdateInput, UpdateJump, UpdatePosition};
use crate::game::state::WorldState;

// =============================================================================
// OPCODES
// =============================================================================

/// Wire opcodes. The numeric values are stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum OpCode {
    /// Client moves its character.
    UpdatePosition = 1,
    /// Client changes its direction axis.
    UpdateInput = 2,
    /// Server heartbeat snapshot (outbound only).
    UpdateState = 3,
    /// Client jumps.
    UpdateJump = 4,
    /// Client spawns its character.
    DoSpawn = 5,
    /// Client changes its color.
    UpdateColor = 6,
    /// Server full snapshot after spawn (outbound only).
    InitialState = 7,
}

impl OpCode {
    /// Numeric wire value.
    pub const fn code(self) -> i64 {
        self as i64
    }

    /// Parse a wire value.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::UpdatePosition),
            2 => Some(Self::UpdateInput),
            3 => Some(Self::UpdateState),
            4 => Some(Self::UpdateJump),
            5 => Some(Self::DoSpawn),
            6 => Some(Self::UpdateColor),
            7 => Some(Self::InitialState),
            _ => None,
        }
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

// =============================================================================
// REDUCERS
// =============================================================================

/// Command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Payload did not match the opcode's shape.
    #[error("malformed {op_code} payload: {source}")]
    Decode {
        /// Opcode being decoded.
        op_code: OpCode,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// A state reducer for one opcode.
pub type Reducer = fn(&MatchData, &mut WorldState) -> Result<(), CommandError>;

/// Look up the reducer for an opcode.
///
/// Outbound-only opcodes and unknown values have no reducer.
pub fn reducer(op_code: i64) -> Option<Reducer> {
    match OpCode::from_code(op_code)? {
        OpCode::UpdatePosition => Some(update_position),
        OpCode::UpdateInput => Some(update_input),
        OpCode::UpdateJump => Some(update_jump),
        OpCode::DoSpawn => Some(do_spawn),
        OpCode::UpdateColor => Some(update_color),
        OpCode::UpdateState | OpCode::InitialState => None,
    }
}

/// Decode a message body for the given opcode.
pub fn decode<T: serde::de::DeserializeOwned>(
    op_code: OpCode,
    data: &[u8],
) -> Result<T, CommandError> {
    serde_json::from_slice(data).map_err(|source| CommandError::Decode { op_code, source })
}

fn update_position(msg: &MatchData, state: &mut WorldState) -> Result<(), CommandError> {
    let cmd: UpdatePosition = decode(OpCode::UpdatePosition, &msg.data)?;
    if let Some(position) = state.position_mut(&cmd.id) {
        *position = cmd.position;
    }
    Ok(())
}

fn update_input(msg: &MatchData, state: &mut WorldState) -> Result<(), CommandError> {
    let cmd: UpdateInput = decode(OpCode::UpdateInput, &msg.data)?;
    if let Some(input) = state.input_mut(&cmd.id) {
        input.direction = cmd.input;
    }
    Ok(())
}

fn update_jump(msg: &MatchData, state: &mut WorldState) -> Result<(), CommandError> {
    let cmd: UpdateJump = decode(OpCode::UpdateJump, &msg.data)?;
    if let Some(input) = state.input_mut(&cmd.id) {
        input.jump = true;
    }
    Ok(())
}

// The spawn payload's `id` is a display name, so the color goes to the sender.
fn do_spawn(msg: &MatchData, state: &mut WorldState) -> Result<(), CommandError> {
    let cmd: DoSpawn = decode(OpCode::DoSpawn, &msg.data)?;
    if let Some(color) = state.color_mut(&msg.sender) {
        *color = cmd.color;
    }
    Ok(())
}

fn update_color(msg: &MatchData, _state: &mut WorldState) -> Result<(), CommandError> {
    decode::<UpdateColor>(OpCode::UpdateColor, &msg.data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::messages::MatchMessage;
    use crate::game::state::{Color, OwnerKey, Position, Presence};
    use tokio::sync::mpsc;

    fn world_with(ids: &[&str]) -> (WorldState, Vec<mpsc::Receiver<MatchMessage>>) {
        let mut state = WorldState::new();
        let mut receivers = Vec::new();
        for (i, id) in ids.iter().enumerate() {
            let (tx, rx) = mpsc::channel(4);
            receivers.push(rx);
            state.insert(Presence::new(OwnerKey::new(*id), *id, tx), format!("user_{}", i + 1));
        }
        (state, receivers)
    }

    fn apply(state: &mut WorldState, op: OpCode, sender: &str, body: &str) -> Result<(), CommandError> {
        let msg = MatchData::new(op.code(), OwnerKey::new(sender), body);
        let reduce = reducer(op.code()).expect("reducer registered");
        reduce(&msg, state)
    }

    #[test]
    fn test_opcode_values() {
        assert_eq!(OpCode::UpdatePosition.code(), 1);
        assert_eq!(OpCode::UpdateInput.code(), 2);
        assert_eq!(OpCode::UpdateState.code(), 3);
        assert_eq!(OpCode::UpdateJump.code(), 4);
        assert_eq!(OpCode::DoSpawn.code(), 5);
        assert_eq!(OpCode::UpdateColor.code(), 6);
        assert_eq!(OpCode::InitialState.code(), 7);

        for code in 1..=7 {
            assert_eq!(OpCode::from_code(code).unwrap().code(), code);
        }
        assert!(OpCode::from_code(0).is_none());
        assert!(OpCode::from_code(99).is_none());
    }

    #[test]
    fn test_reducer_table() {
        assert!(reducer(1).is_some());
        assert!(reducer(2).is_some());
        assert!(reducer(4).is_some());
        assert!(reducer(5).is_some());
        assert!(reducer(6).is_some());

        // Outbound-only and unknown opcodes
        assert!(reducer(3).is_none());
        assert!(reducer(7).is_none());
        assert!(reducer(99).is_none());
        assert!(reducer(-1).is_none());
    }

    #[test]
    fn test_update_position() {
        let (mut state, _rx) = world_with(&["a", "b"]);

        apply(&mut state, OpCode::UpdatePosition, "a", r#"{"id":"a","position":{"x":42.0,"y":17.0}}"#)
            .unwrap();

        assert_eq!(state.position(&"a".into()), Some(&Position::new(42.0, 17.0)));
        assert_eq!(state.position(&"b".into()), Some(&Position::default()));
    }

    #[test]
    fn test_unknown_target_is_ignored() {
        let (mut state, _rx) = world_with(&["a"]);

        apply(&mut state, OpCode::UpdatePosition, "a", r#"{"id":"gone","position":{"x":1.0,"y":1.0}}"#)
            .unwrap();
        apply(&mut state, OpCode::UpdateJump, "a", r#"{"id":"gone"}"#).unwrap();

        assert_eq!(state.len(), 1);
        assert!(state.position(&"gone".into()).is_none());
        assert!(state.is_consistent());
    }

    #[test]
    fn test_update_input_keeps_jump() {
        let (mut state, _rx) = world_with(&["a"]);

        apply(&mut state, OpCode::UpdateJump, "a", r#"{"id":"a"}"#).unwrap();
        apply(&mut state, OpCode::UpdateInput, "a", r#"{"id":"a","input":-1.0}"#).unwrap();

        let input = state.input(&"a".into()).unwrap();
        assert_eq!(input.direction, -1.0);
        assert!(input.jump);
    }

    #[test]
    fn test_do_spawn_sets_sender_color() {
        let (mut state, _rx) = world_with(&["a"]);

        apply(
            &mut state,
            OpCode::DoSpawn,
            "a",
            r#"{"id":"Hero","col":{"r":1.0,"g":0.0,"b":0.0,"a":1.0},"nm":"Hero"}"#,
        )
        .unwrap();

        assert_eq!(state.color(&"a".into()), Some(&Color::new(1.0, 0.0, 0.0, 1.0)));
        // Name reconciliation belongs to the session, not the reducer
        assert_eq!(state.name(&"a".into()), Some("user_1"));
    }

    #[test]
    fn test_update_color_only_validates() {
        let (mut state, _rx) = world_with(&["a"]);

        apply(
            &mut state,
            OpCode::UpdateColor,
            "a",
            r#"{"id":"a","color":{"r":0.0,"g":1.0,"b":0.0,"a":1.0}}"#,
        )
        .unwrap();
        assert!(state.color(&"a".into()).unwrap().is_unset());

        let err = apply(&mut state, OpCode::UpdateColor, "a", r#"{"id":"a"}"#);
        assert!(matches!(err, Err(CommandError::Decode { op_code: OpCode::UpdateColor, .. })));
    }

    #[test]
    fn test_decode_error_applies_nothing() {
        let (mut state, _rx) = world_with(&["a"]);

        let err = apply(&mut state, OpCode::UpdatePosition, "a", r#"{"id":"a","position":{"x":1.0}}"#);
        assert!(err.is_err());
        assert_eq!(state.position(&"a".into()), Some(&Position::default()));

        let err = apply(&mut state, OpCode::DoSpawn, "a", "not json");
        assert!(err.unwrap_err().to_string().contains("DoSpawn(5)"));
        assert!(state.color(&"a".into()).unwrap().is_unset());
    }
}
