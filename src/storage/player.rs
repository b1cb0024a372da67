//! Player Records
//!
//! A player's last position is stored under their display name rather than
//! their owner key, so it follows the character across connections.

use tracing::debug;

use crate::game::state::{OwnerKey, Position, WorldState};
use crate::storage::{
    ObjectId, ReadPermission, StorageBackend, StorageError, StorageWrite, WritePermission,
};

/// Collection holding per-player records.
pub const PLAYER_COLLECTION: &str = "player_data";

/// Key prefix of position records.
pub const POSITION_KEY_PREFIX: &str = "position";

/// Storage key of a display name's position record.
pub fn position_key(display_name: &str) -> String {
    format!("{}_{}", POSITION_KEY_PREFIX, display_name)
}

fn position_id(state: &WorldState, owner: &OwnerKey) -> Option<ObjectId> {
    let name = state.name(owner)?;
    Some(ObjectId::new(PLAYER_COLLECTION, position_key(name), Some(owner.clone())))
}

/// Build the write that stores a participant's current position.
///
/// `Ok(None)` if the owner key is not live.
pub fn make_player_write(
    state: &WorldState,
    owner: &OwnerKey,
) -> Result<Option<StorageWrite>, StorageError> {
    let (Some(id), Some(position)) = (position_id(state, owner), state.position(owner)) else {
        return Ok(None);
    };

    let value = serde_json::to_string(position).map_err(StorageError::Encode)?;
    Ok(Some(StorageWrite {
        id,
        value,
        permission_read: ReadPermission::OwnerRead,
        permission_write: WritePermission::OwnerWrite,
    }))
}

/// Persist a participant's current position.
pub async fn save_player(
    storage: &dyn StorageBackend,
    state: &WorldState,
    owner: &OwnerKey,
) -> Result<(), StorageError> {
    if let Some(write) = make_player_write(state, owner)? {
        let ack = storage.write(write).await?;
        debug!("Saved {} for {}", ack.id.key, owner);
    }
    Ok(())
}

/// Load the stored position for a participant's current display name.
///
/// `Ok(None)` means this display name has never been saved.
pub async fn load_player(
    storage: &dyn StorageBackend,
    state: &WorldState,
    owner: &OwnerKey,
) -> Result<Option<Position>, StorageError> {
    let Some(id) = position_id(state, owner) else {
        return Ok(None);
    };

    match storage.read(&id).await? {
        Some(object) => object.decode().map(Some),
        None => Ok(None),
    }
}
