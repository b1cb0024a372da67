//! Network Layer
//!
//! WebSocket server, match sessions and RPCs. All world rules live in
//! `game/`; this layer only schedules and routes.

pub mod protocol;
pub mod rpc;
pub mod server;
pub mod session;

pub use protocol::{ClientMessage, ErrorCode, ServerError, ServerMessage};
pub use rpc::RpcError;
pub use server::{GameServer, GameServerError};
pub use session::{MatchId, SessionError, SessionHandle, SessionManager};
