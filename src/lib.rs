//! # World Server
//!
//! Authoritative server for a shared 2D world. Clients send intents; the
//! server applies them in order, ticks the world at a fixed rate, and
//! persists each player's last position under their character name.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       WORLD SERVER                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/           - World rules (no I/O except storage)       │
//! │  ├── state.rs    - Participants and per-entity maps          │
//! │  ├── messages.rs - Opcode payloads and snapshots             │
//! │  ├── command.rs  - Opcode table and reducers                 │
//! │  └── world.rs    - Match lifecycle and the tick              │
//! │                                                              │
//! │  storage/        - Persisted records                         │
//! │  ├── memory.rs   - In-memory backend                         │
//! │  ├── file.rs     - JSON file backend                         │
//! │  ├── player.rs   - Position records                          │
//! │  └── names.rs    - Reserved character names                  │
//! │                                                              │
//! │  network/        - Networking                                │
//! │  ├── server.rs   - WebSocket server                          │
//! │  ├── protocol.rs - Message types                             │
//! │  ├── session.rs  - Match tasks and session manager           │
//! │  └── rpc.rs      - Server RPCs                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Each match is owned by a single task. Joins, leaves and inbound data are
//! handled in arrival order, and per-entity maps are `BTreeMap`s so every
//! snapshot lists participants in the same order.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod game;
pub mod network;
pub mod storage;

// Re-export commonly used types
pub use config::ServerConfig;
pub use game::{OpCode, OwnerKey, Position, WorldMatch, WorldState};
pub use network::{GameServer, SessionManager};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// World tick rate (Hz)
pub const TICK_RATE: u32 = 10;

/// Label every world match reports.
pub const MATCH_LABEL: &str = "world";
