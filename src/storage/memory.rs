//! In-process storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::storage::{ObjectAck, ObjectId, StorageBackend, StorageError, StorageObject, StorageWrite};

/// Storage that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: RwLock<BTreeMap<ObjectId, StorageObject>>,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn read(&self, id: &ObjectId) -> Result<Option<StorageObject>, StorageError> {
        Ok(self.objects.read().await.get(id).cloned())
    }

    async fn write(&self, write: StorageWrite) -> Result<ObjectAck, StorageError> {
        let mut objects = self.objects.write().await;
        let previous = objects.get(&write.id).cloned();
        let object = StorageObject::from_write(write, previous.as_ref());
        let ack = ObjectAck {
            id: object.id.clone(),
            version: object.version.clone(),
        };
        objects.insert(object.id.clone(), object);
        Ok(ack)
    }
}
