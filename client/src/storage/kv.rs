//! Secure key-value storage for the credential and user profile

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::ClientError;
use crate::filesys::file::File;

/// Keys used by the session
pub mod keys {
    pub const ID_TOKEN: &str = "id_token";
    pub const USER_INFO: &str = "user_info";
}

/// Durable get/set/delete storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), ClientError>;
}

/// In-memory store, used when nothing should touch the disk
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

/// JSON-file backed store readable only by its owner.
///
/// All keys live in one file that is rewritten atomically on every change.
pub struct FileKeyValueStore {
    file: Arc<File>,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(file: Arc<File>) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<HashMap<String, String>, ClientError> {
        if !self.file.exists().await {
            return Ok(HashMap::new());
        }
        self.file.read_json().await.map_err(|e| {
            ClientError::StorageError(format!(
                "Failed to read {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn save(&self, entries: &HashMap<String, String>) -> Result<(), ClientError> {
        self.file.write_json(entries).await?;
        self.file.set_permissions_600().await?;
        debug!("Saved {} key(s) to {}", entries.len(), self.file.path().display());
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries).await
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}
