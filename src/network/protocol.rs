//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every frame is a JSON text message tagged by `type`. Match payloads
//! travel as strings and are handed to the match as raw bytes.

use serde::{Deserialize, Serialize};

use crate::game::messages::MatchMessage;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declare the connection's identity.
    Hello {
        /// Stable user identifier.
        user_id: String,
        /// Optional account name.
        #[serde(default)]
        username: Option<String>,
    },

    /// Call a server RPC.
    Rpc {
        /// RPC name.
        id: String,
        /// RPC argument.
        #[serde(default)]
        payload: Option<String>,
    },

    /// Join a world match.
    MatchJoin {
        /// Match identifier from `get_world_id`.
        match_id: String,
    },

    /// Send data to the joined match.
    MatchData {
        /// Opcode.
        op_code: i64,
        /// Payload.
        data: String,
    },

    /// Leave the joined match.
    MatchLeave,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp.
        timestamp: u64,
    },
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Identity accepted.
    Welcome {
        /// Transport session id.
        session_id: String,
    },

    /// RPC result.
    RpcResult {
        /// RPC name.
        id: String,
        /// Result payload on success.
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<String>,
        /// Error text on failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Joined a match.
    MatchJoined {
        /// Match identifier.
        match_id: String,
        /// Match label.
        label: String,
    },

    /// Join refused.
    MatchRejected {
        /// Human-readable reason.
        reason: String,
    },

    /// Data from the match.
    MatchData {
        /// Opcode.
        op_code: i64,
        /// Payload.
        data: String,
        /// Participant the data was relayed from.
        #[serde(skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
    },

    /// Pong response.
    Pong {
        /// Echoed client timestamp.
        timestamp: u64,
        /// Server time (ms since epoch).
        server_time: u64,
    },

    /// Error message.
    Error(ServerError),

    /// Server is shutting down.
    Shutdown {
        /// Reason.
        reason: String,
    },
}

impl From<MatchMessage> for ServerMessage {
    fn from(msg: MatchMessage) -> Self {
        ServerMessage::MatchData {
            op_code: msg.op_code,
            data: String::from_utf8_lossy(&msg.data).into_owned(),
            sender: msg.sender.map(|s| s.to_string()),
        }
    }
}

/// Server error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Build an error frame.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// A `hello` is required first.
    NotIdentified,
    /// Frame could not be parsed.
    InvalidInput,
    /// Match not found.
    MatchNotFound,
    /// Already in a match.
    AlreadyInMatch,
    /// Not in a match.
    NotInMatch,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
