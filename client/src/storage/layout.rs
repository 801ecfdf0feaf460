//! Storage layout configuration

use std::path::PathBuf;

use tokio::fs;

use crate::errors::ClientError;
use crate::filesys::file::File;

/// Storage layout for the client
#[derive(Debug, Clone)]
pub struct StorageLayout {
    /// Base directory for all storage
    pub base_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the settings file path
    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Key-value store holding the credential and user profile
    pub fn credentials_file(&self) -> File {
        File::new(self.base_dir.join("credentials.json"))
    }

    /// Get the logs directory
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Setup the storage layout (create directories)
    pub async fn setup(&self) -> Result<(), ClientError> {
        fs::create_dir_all(&self.base_dir).await?;
        fs::create_dir_all(self.logs_dir()).await?;
        Ok(())
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        let base_dir = home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".homeglow");

        Self::new(base_dir)
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
