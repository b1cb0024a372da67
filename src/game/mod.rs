//! Game Logic Module
//!
//! The world match and everything it reads and writes.
//!
//! ## Module Structure
//!
//! - `state`: Participants and their per-entity maps
//! - `messages`: Match envelopes and opcode payloads
//! - `command`: Opcode table and reducers
//! - `world`: Match lifecycle and the tick

pub mod command;
pub mod messages;
pub mod state;
pub mod world;

// Re-export key types
pub use command::{CommandError, OpCode};
pub use messages::{MatchData, MatchMessage};
pub use state::{Color, Input, OwnerKey, Position, Presence, WorldState};
pub use world::{Broadcast, JoinDecision, MatchError, Recipients, WorldMatch, SPAWN_POSITION};
