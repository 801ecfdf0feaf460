//! Key-value store and storage layout tests

use std::sync::Arc;

use homeglow::filesys::file::File;
use homeglow::storage::kv::{keys, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
use homeglow::storage::layout::StorageLayout;
use homeglow::storage::settings::Settings;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_memory_store_get_set_delete() {
    let store = MemoryKeyValueStore::new();

    assert_eq!(store.get(keys::ID_TOKEN).await.unwrap(), None);
    assert_ok!(store.set(keys::ID_TOKEN, "abc").await);
    assert_eq!(store.get(keys::ID_TOKEN).await.unwrap().as_deref(), Some("abc"));

    assert_ok!(store.delete(keys::ID_TOKEN).await);
    assert_ok!(store.delete(keys::ID_TOKEN).await);
    assert_eq!(store.get(keys::ID_TOKEN).await.unwrap(), None);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("credentials.json");

    let store = FileKeyValueStore::new(Arc::new(File::new(&path)));
    store.set(keys::ID_TOKEN, "token").await.unwrap();
    store.set(keys::USER_INFO, "{\"uid\":\"user-1\"}").await.unwrap();

    let reopened = FileKeyValueStore::new(Arc::new(File::new(&path)));
    assert_eq!(reopened.get(keys::ID_TOKEN).await.unwrap().as_deref(), Some("token"));

    reopened.delete(keys::ID_TOKEN).await.unwrap();
    assert_eq!(store.get(keys::ID_TOKEN).await.unwrap(), None);
    assert!(store.get(keys::USER_INFO).await.unwrap().is_some());
}

#[cfg(unix)]
#[tokio::test]
async fn test_file_store_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    let store = FileKeyValueStore::new(Arc::new(File::new(&path)));
    store.set(keys::ID_TOKEN, "token").await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_corrupt_store_is_storage_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "not json").unwrap();

    let store = FileKeyValueStore::new(Arc::new(File::new(&path)));
    assert_err!(store.get(keys::ID_TOKEN).await);
}

#[tokio::test]
async fn test_layout_setup_creates_directories() {
    let dir = tempdir().unwrap();
    let layout = StorageLayout::new(dir.path().join("homeglow"));

    assert_ok!(layout.setup().await);

    assert!(layout.base_dir.is_dir());
    assert!(layout.logs_dir().is_dir());
    assert!(layout.credentials_file().path().starts_with(&layout.base_dir));
}

#[tokio::test]
async fn test_missing_settings_file_uses_defaults() {
    let dir = tempdir().unwrap();
    let layout = StorageLayout::new(dir.path());

    let settings = Settings::load(&layout.settings_file()).await.unwrap();

    assert!(settings.enable_poller);
    assert_eq!(settings.polling_interval_secs, 5);
    assert_eq!(settings.staleness_threshold, 3);
}
