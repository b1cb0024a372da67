//! JSON file storage backend.
//!
//! Keeps every object in memory and rewrites the whole file after each write.
//! Durability is best effort: a write returns once the file has been replaced.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::storage::{ObjectAck, ObjectId, StorageBackend, StorageError, StorageObject, StorageWrite};

/// Storage persisted to a single JSON file.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    objects: Mutex<BTreeMap<ObjectId, StorageObject>>,
}

impl FileStorage {
    /// Open a store, loading the file if it exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();

        let objects = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<StorageObject> = serde_json::from_slice(&bytes).map_err(|source| {
                    StorageError::Decode {
                        collection: "*".to_string(),
                        key: path.display().to_string(),
                        source,
                    }
                })?;
                list.into_iter().map(|o| (o.id.clone(), o)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened storage file {} ({} objects)", path.display(), objects.len());

        Ok(Self {
            path,
            objects: Mutex::new(objects),
        })
    }

    async fn flush(&self, objects: &BTreeMap<ObjectId, StorageObject>) -> Result<(), StorageError> {
        let list: Vec<&StorageObject> = objects.values().collect();
        let bytes = serde_json::to_vec_pretty(&list).map_err(StorageError::Encode)?;

        // Replace atomically so a crash never leaves a truncated file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Flushed {} objects to {}", list.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileStorage {
    async fn read(&self, id: &ObjectId) -> Result<Option<StorageObject>, StorageError> {
        Ok(self.objects.lock().await.get(id).cloned())
    }

    async fn write(&self, write: StorageWrite) -> Result<ObjectAck, StorageError> {
        let mut objects = self.objects.lock().await;
        let previous = objects.get(&write.id).cloned();
        let object = StorageObject::from_write(write, previous.as_ref());
        let ack = ObjectAck {
            id: object.id.clone(),
            version: object.version.clone(),
        };

        objects.insert(object.id.clone(), object);
        if let Err(e) = self.flush(&objects).await {
            // Keep memory and disk in agreement
            match previous {
                Some(previous) => {
                    objects.insert(ack.id.clone(), previous);
                }
                None => {
                    objects.remove(&ack.id);
                }
            }
            return Err(e);
        }

        Ok(ack)
    }
}
