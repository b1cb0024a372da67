//! World State Definitions
//!
//! Per-participant state held by a world match.
//! Uses BTreeMap so snapshots serialize in a stable order.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::game::messages::MatchMessage;

// =============================================================================
// OWNER KEY
// =============================================================================

/// Stable identifier of a connected participant (the user id).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    /// Create from any string-like identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// =============================================================================
// COMPONENTS
// =============================================================================

/// World-space position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate.
    pub x: f64,
    /// Vertical coordinate.
    pub y: f64,
}

impl Position {
    /// Create a position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Latest input of a participant.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// Horizontal direction axis.
    #[serde(rename = "d")]
    pub direction: f64,
    /// Jump pulse. Only true during the tick it was received in.
    #[serde(rename = "j")]
    pub jump: bool,
}

/// RGBA color. All zero means the player has not picked one yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel.
    #[serde(rename = "r")]
    pub red: f64,
    /// Green channel.
    #[serde(rename = "g")]
    pub green: f64,
    /// Blue channel.
    #[serde(rename = "b")]
    pub blue: f64,
    /// Alpha channel.
    #[serde(rename = "a")]
    pub alpha: f64,
}

impl Color {
    /// Create a color.
    pub const fn new(red: f64, green: f64, blue: f64, alpha: f64) -> Self {
        Self { red, green, blue, alpha }
    }

    /// Whether the color is still the unset value.
    pub fn is_unset(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Live connection handle of a participant.
#[derive(Clone, Debug)]
pub struct Presence {
    /// Owner key of the participant.
    pub user_id: OwnerKey,
    /// Transport session the presence belongs to.
    pub session_id: uuid::Uuid,
    /// Account name reported by the client.
    pub username: String,
    /// Outbound channel to the client's connection.
    pub sender: mpsc::Sender<MatchMessage>,
}

impl Presence {
    /// Create a presence with a fresh transport session id.
    pub fn new(
        user_id: OwnerKey,
        username: impl Into<String>,
        sender: mpsc::Sender<MatchMessage>,
    ) -> Self {
        Self {
            user_id,
            session_id: uuid::Uuid::new_v4(),
            username: username.into(),
            sender,
        }
    }
}

// =============================================================================
// WORLD STATE
// =============================================================================

/// Authoritative state of one world match.
///
/// The five maps are private and only change together: every owner key is
/// either present in all of them or in none.
#[derive(Debug, Default)]
pub struct WorldState {
    presences: BTreeMap<OwnerKey, Presence>,
    positions: BTreeMap<OwnerKey, Position>,
    inputs: BTreeMap<OwnerKey, Input>,
    colors: BTreeMap<OwnerKey, Color>,
    names: BTreeMap<OwnerKey, String>,
}

impl WorldState {
    /// Create an empty world.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant with zeroed state and a placeholder name.
    ///
    /// Returns false (and changes nothing) if the owner key is already live.
    pub fn insert(&mut self, presence: Presence, placeholder_name: String) -> bool {
        let key = presence.user_id.clone();
        if self.presences.contains_key(&key) {
            return false;
        }

        self.positions.insert(key.clone(), Position::default());
        self.inputs.insert(key.clone(), Input::default());
        self.colors.insert(key.clone(), Color::default());
        self.names.insert(key.clone(), placeholder_name);
        self.presences.insert(key, presence);
        true
    }

    /// Remove a participant from every map at once.
    pub fn remove(&mut self, key: &OwnerKey) -> Option<Presence> {
        let presence = self.presences.remove(key)?;
        self.positions.remove(key);
        self.inputs.remove(key);
        self.colors.remove(key);
        self.names.remove(key);
        Some(presence)
    }

    /// Whether the owner key is live.
    pub fn contains(&self, key: &OwnerKey) -> bool {
        self.presences.contains_key(key)
    }

    /// Number of live participants.
    pub fn len(&self) -> usize {
        self.presences.len()
    }

    /// Whether nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.presences.is_empty()
    }

    /// Live connection handle of a participant.
    pub fn presence(&self, key: &OwnerKey) -> Option<&Presence> {
        self.presences.get(key)
    }

    /// All live connection handles.
    pub fn presences(&self) -> impl Iterator<Item = &Presence> {
        self.presences.values()
    }

    /// All live owner keys, in order.
    pub fn owner_keys(&self) -> impl Iterator<Item = &OwnerKey> {
        self.presences.keys()
    }

    /// Get a participant's position.
    pub fn position(&self, key: &OwnerKey) -> Option<&Position> {
        self.positions.get(key)
    }

    /// Get a participant's position mutably.
    pub fn position_mut(&mut self, key: &OwnerKey) -> Option<&mut Position> {
        self.positions.get_mut(key)
    }

    /// Get a participant's input.
    pub fn input(&self, key: &OwnerKey) -> Option<&Input> {
        self.inputs.get(key)
    }

    /// Get a participant's input mutably.
    pub fn input_mut(&mut self, key: &OwnerKey) -> Option<&mut Input> {
        self.inputs.get_mut(key)
    }

    /// Get a participant's color.
    pub fn color(&self, key: &OwnerKey) -> Option<&Color> {
        self.colors.get(key)
    }

    /// Get a participant's color mutably.
    pub fn color_mut(&mut self, key: &OwnerKey) -> Option<&mut Color> {
        self.colors.get_mut(key)
    }

    /// Get a participant's display name.
    pub fn name(&self, key: &OwnerKey) -> Option<&str> {
        self.names.get(key).map(String::as_str)
    }

    /// Replace a participant's display name. No-op for unknown keys.
    pub fn set_name(&mut self, key: &OwnerKey, name: impl Into<String>) -> bool {
        match self.names.get_mut(key) {
            Some(current) => {
                *current = name.into();
                true
            }
            None => false,
        }
    }

    /// Position table.
    pub fn positions(&self) -> &BTreeMap<OwnerKey, Position> {
        &self.positions
    }

    /// Input table.
    pub fn inputs(&self) -> &BTreeMap<OwnerKey, Input> {
        &self.inputs
    }

    /// Color table.
    pub fn colors(&self) -> &BTreeMap<OwnerKey, Color> {
        &self.colors
    }

    /// Display name table.
    pub fn names(&self) -> &BTreeMap<OwnerKey, String> {
        &self.names
    }

    /// End-of-tick reset of the jump pulse.
    pub fn clear_jumps(&mut self) {
        for input in self.inputs.values_mut() {
            input.jump = false;
        }
    }

    /// Check that all five maps hold exactly the same owner keys.
    pub fn is_consistent(&self) -> bool {
        let len = self.presences.len();
        if self.positions.len() != len
            || self.inputs.len() != len
            || self.colors.len() != len
            || self.names.len() != len
        {
            return false;
        }

        self.presences.keys().all(|key| {
            self.positions.contains_key(key)
                && self.inputs.contains_key(key)
                && self.colors.contains_key(key)
                && self.names.contains_key(key)
        })
    }
}
