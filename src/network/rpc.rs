//! Server RPCs
//!
//! Small request/response calls made outside of a match: finding the world
//! and reserving character names.

use thiserror::Error;
use tracing::{debug, info};

use crate::network::session::SessionManager;
use crate::storage::names::{register_name, release_name};
use crate::storage::StorageError;

/// Return the running world's match id.
pub const GET_WORLD_ID: &str = "get_world_id";
/// Reserve a display name.
pub const REGISTER_CHARACTER_NAME: &str = "register_character_name";
/// Release a display name.
pub const REMOVE_CHARACTER_NAME: &str = "remove_character_name";

/// RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No RPC with that id.
    #[error("unknown rpc {0:?}")]
    Unknown(String),

    /// The RPC needs a payload.
    #[error("rpc {0} requires a payload")]
    MissingPayload(&'static str),

    /// Storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Run an RPC by id.
pub async fn dispatch(
    sessions: &SessionManager,
    id: &str,
    payload: Option<&str>,
) -> Result<String, RpcError> {
    debug!("RPC {} ({:?})", id, payload);

    match id {
        GET_WORLD_ID => Ok(get_world_id(sessions).await),
        REGISTER_CHARACTER_NAME => {
            let name = required(REGISTER_CHARACTER_NAME, payload)?;
            register_character_name(sessions, name).await
        }
        REMOVE_CHARACTER_NAME => {
            let name = required(REMOVE_CHARACTER_NAME, payload)?;
            remove_character_name(sessions, name).await
        }
        other => Err(RpcError::Unknown(other.to_string())),
    }
}

fn required<'a>(rpc: &'static str, payload: Option<&'a str>) -> Result<&'a str, RpcError> {
    payload
        .filter(|p| !p.is_empty())
        .ok_or(RpcError::MissingPayload(rpc))
}

/// Id of the single world match, started on demand.
pub async fn get_world_id(sessions: &SessionManager) -> String {
    sessions.find_or_create().await.id().to_string()
}

/// `"1"` if the name was free and is now reserved, `"0"` if taken.
pub async fn register_character_name(
    sessions: &SessionManager,
    name: &str,
) -> Result<String, RpcError> {
    let registered = register_name(sessions.storage().as_ref(), name).await?;
    if registered {
        info!("Reserved character name {:?}", name);
    }
    Ok(if registered { "1" } else { "0" }.to_string())
}

/// Release a name. Always `"1"` unless storage fails.
pub async fn remove_character_name(
    sessions: &SessionManager,
    name: &str,
) -> Result<String, RpcError> {
    release_name(sessions.storage().as_ref(), name).await?;
    info!("Released character name {:?}", name);
    Ok("1".to_string())
}
