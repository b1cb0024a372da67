//! Reserved Character Names
//!
//! One system-owned record lists every display name in use, across all world
//! matches. Updates are whole-value read-modify-write; two concurrent callers
//! can race and one update may be lost. There is no cross-session lock.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::storage::{
    ObjectId, ReadPermission, StorageBackend, StorageError, StorageWrite, WritePermission,
};

/// Collection holding server-wide records.
pub const GLOBAL_COLLECTION: &str = "global_data";

/// Key of the reserved-name record.
pub const NAMES_KEY: &str = "names";

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalNames {
    names: Vec<String>,
}

fn names_id() -> ObjectId {
    ObjectId::new(GLOBAL_COLLECTION, NAMES_KEY, None)
}

/// Read the full reserved-name list. Empty if never written.
pub async fn load_reserved_names(storage: &dyn StorageBackend) -> Result<Vec<String>, StorageError> {
    match storage.read(&names_id()).await? {
        Some(object) => Ok(object.decode::<GlobalNames>()?.names),
        None => Ok(Vec::new()),
    }
}

/// Replace the full reserved-name list.
pub async fn save_reserved_names(
    storage: &dyn StorageBackend,
    names: Vec<String>,
) -> Result<(), StorageError> {
    let value = serde_json::to_string(&GlobalNames { names }).map_err(StorageError::Encode)?;
    storage
        .write(StorageWrite {
            id: names_id(),
            value,
            permission_read: ReadPermission::PublicRead,
            permission_write: WritePermission::NoWrite,
        })
        .await?;
    Ok(())
}

/// Claim a display name. Returns false if someone already holds it.
pub async fn register_name(storage: &dyn StorageBackend, name: &str) -> Result<bool, StorageError> {
    let mut names = load_reserved_names(storage).await?;
    if names.iter().any(|n| n == name) {
        debug!("Name {:?} already reserved", name);
        return Ok(false);
    }

    names.push(name.to_string());
    save_reserved_names(storage, names).await?;
    Ok(true)
}

/// Release a display name. Releasing an unknown name succeeds.
pub async fn release_name(storage: &dyn StorageBackend, name: &str) -> Result<(), StorageError> {
    let mut names = load_reserved_names(storage).await?;
    if names.is_empty() {
        return Ok(());
    }

    names.retain(|n| n != name);
    save_reserved_names(storage, names).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_empty_by_default() {
        let storage = MemoryStorage::new();
        assert!(load_reserved_names(&storage).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_whole_list() {
        let storage = MemoryStorage::new();
        save_reserved_names(&storage, vec!["a".into(), "b".into()]).await.unwrap();
        save_reserved_names(&storage, vec!["c".into()]).await.unwrap();

        assert_eq!(load_reserved_names(&storage).await.unwrap(), vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn test_record_shape_and_permissions() {
        let storage = MemoryStorage::new();
        save_reserved_names(&storage, vec!["Hero".into()]).await.unwrap();

        let object = storage.read(&names_id()).await.unwrap().unwrap();
        assert_eq!(object.value, r#"{"names":["Hero"]}"#);
        assert_eq!(object.id.owner, None);
        assert_eq!(object.permission_read, ReadPermission::PublicRead);
        assert_eq!(object.permission_write, WritePermission::NoWrite);
    }

    #[tokio::test]
    async fn test_register_appends_and_rejects_duplicates() {
        let storage = MemoryStorage::new();

        assert!(register_name(&storage, "Hero").await.unwrap());
        assert!(register_name(&storage, "Sidekick").await.unwrap());
        assert!(!register_name(&storage, "Hero").await.unwrap());

        let names = load_reserved_names(&storage).await.unwrap();
        assert_eq!(names, vec!["Hero".to_string(), "Sidekick".to_string()]);
    }

    #[tokio::test]
    async fn test_release() {
        let storage = MemoryStorage::new();
        register_name(&storage, "Hero").await.unwrap();
        register_name(&storage, "Sidekick").await.unwrap();

        release_name(&storage, "Hero").await.unwrap();
        release_name(&storage, "Unknown").await.unwrap();

        assert_eq!(load_reserved_names(&storage).await.unwrap(), vec!["Sidekick".to_string()]);
        assert!(register_name(&storage, "Hero").await.unwrap());
    }
}
