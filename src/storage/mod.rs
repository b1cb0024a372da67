//! Durable Storage
//!
//! Collection/key/owner addressed object store used for state that outlives
//! a world match, plus the adapters that map world state onto records.
//!
//! ## Module Structure
//!
//! - `memory`: in-process backend
//! - `file`: JSON file backend
//! - `player`: player position records
//! - `names`: global reserved character names

pub mod file;
pub mod memory;
pub mod names;
pub mod player;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::state::OwnerKey;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Who may read an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadPermission {
    /// Server only.
    NoRead,
    /// The owner and the server.
    #[default]
    OwnerRead,
    /// Anyone.
    PublicRead,
}

/// Who may write an object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePermission {
    /// Server only.
    NoWrite,
    /// The owner and the server.
    #[default]
    OwnerWrite,
}

/// Address of a stored object. `owner == None` marks a system-owned object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    /// Collection name.
    pub collection: String,
    /// Key inside the collection.
    pub key: String,
    /// Owning user.
    pub owner: Option<OwnerKey>,
}

impl ObjectId {
    /// Address an object.
    pub fn new(collection: impl Into<String>, key: impl Into<String>, owner: Option<OwnerKey>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
            owner,
        }
    }
}

/// A write request.
#[derive(Clone, Debug, PartialEq)]
pub struct StorageWrite {
    /// Target address.
    pub id: ObjectId,
    /// JSON value.
    pub value: String,
    /// Read permission to store.
    pub permission_read: ReadPermission,
    /// Write permission to store.
    pub permission_write: WritePermission,
}

/// A stored object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageObject {
    /// Address.
    pub id: ObjectId,
    /// JSON value.
    pub value: String,
    /// Content hash of the value.
    pub version: String,
    /// Read permission.
    pub permission_read: ReadPermission,
    /// Write permission.
    pub permission_write: WritePermission,
    /// First write time.
    pub create_time: DateTime<Utc>,
    /// Last write time.
    pub update_time: DateTime<Utc>,
}

impl StorageObject {
    /// Build the object a write produces, keeping the creation time of any
    /// object it replaces.
    pub fn from_write(write: StorageWrite, previous: Option<&StorageObject>) -> Self {
        let now = Utc::now();
        Self {
            version: object_version(&write.value),
            create_time: previous.map(|p| p.create_time).unwrap_or(now),
            update_time: now,
            id: write.id,
            value: write.value,
            permission_read: write.permission_read,
            permission_write: write.permission_write,
        }
    }

    /// Parse the JSON value.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_str(&self.value).map_err(|source| StorageError::Decode {
            collection: self.id.collection.clone(),
            key: self.id.key.clone(),
            source,
        })
    }
}

/// Acknowledgement of a successful write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectAck {
    /// Address written.
    pub id: ObjectId,
    /// Version now stored.
    pub version: String,
}

/// Hex SHA-256 of a value.
pub fn object_version(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend refused or failed the operation.
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// File backend I/O failure.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    /// A stored value did not have the expected shape.
    #[error("failed to decode {collection}/{key}: {source}")]
    Decode {
        /// Collection of the object.
        collection: String,
        /// Key of the object.
        key: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key/value backend.
///
/// Callers inside the server process are trusted; permissions are stored with
/// each object for client-facing reads.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read one object. `Ok(None)` when nothing is stored at the address.
    async fn read(&self, id: &ObjectId) -> Result<Option<StorageObject>, StorageError>;

    /// Create or replace one object.
    async fn write(&self, write: StorageWrite) -> Result<ObjectAck, StorageError>;
}
