// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Persistent metadata store.
//!
//! The broker keeps three kinds of records, all behind the [`Storage`] trait:
//!
//! | Key | Contents |
//! |-----|----------|
//! | `config` | provider connection settings |
//! | `roles/<name>` | one role definition |
//! | `users` | the pool map for every role |
//!
//! Two implementations are provided. [`MemoryStorage`] keeps everything in a
//! [`BTreeMap`] and can be told to fail individual operations, which is how the
//! tests simulate an unavailable store. [`FileStorage`] keeps one file per key
//! below a root directory.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

/// Errors surfaced by a [`Storage`] implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("storage i/o error: {0}")]
    Io(String),
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("unable to encode or decode entry: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StorageError {
    fn from(source: std::io::Error) -> Self {
        StorageError::Io(source.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(source: serde_json::Error) -> Self {
        StorageError::Serialization(source.to_string())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Byte-oriented key/value store consumed by the registry and credential store.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the entry stored under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Removes `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists the keys directly below `prefix`, relative to it and sorted.
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>>;
}

/// Decodes a JSON entry, mapping absence to `None`.
pub async fn get_json<T>(storage: &dyn Storage, key: &str) -> StorageResult<Option<T>>
where
    T: serde::de::DeserializeOwned,
{
    match storage.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encodes `value` as JSON and stores it under `key`.
pub async fn put_json<T>(storage: &dyn Storage, key: &str, value: &T) -> StorageResult<()>
where
    T: serde::Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)?;
    storage.put(key, bytes).await
}

#[derive(Default)]
struct FailureSwitches {
    get: AtomicBool,
    put: AtomicBool,
    delete: AtomicBool,
    list: AtomicBool,
}

/// In-memory store for tests and local development.
///
/// Each operation can be forced to fail with [`StorageError::Io`], mirroring
/// an outage of the real metadata store.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
    failures: FailureSwitches,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_get(&self, enabled: bool) {
        self.failures.get.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_put(&self, enabled: bool) {
        self.failures.put.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, enabled: bool) {
        self.failures.delete.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_list(&self, enabled: bool) {
        self.failures.list.store(enabled, Ordering::SeqCst);
    }

    fn check(switch: &AtomicBool, operation: &str) -> StorageResult<()> {
        if switch.load(Ordering::SeqCst) {
            return Err(StorageError::Io(format!("{operation} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Self::check(&self.failures.get, "get")?;
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        Self::check(&self.failures.put, "put")?;
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        Self::check(&self.failures.delete, "delete")?;
        self.entries.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        Self::check(&self.failures.list, "list")?;
        let entries = self.entries.read();
        let keys = entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| &key[prefix.len()..])
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string)
            .collect();
        Ok(keys)
    }
}

const STAGING_DIR: &str = ".tmp";

/// File-backed store: one file per key below `root`.
///
/// `/`-separated keys map to subdirectories. Writes are staged in
/// `<root>/.tmp` and renamed into place, so a crash never leaves a torn entry.
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        let valid = key
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != "..");
        if key.is_empty() || !valid || key.split('/').next() == Some(STAGING_DIR) {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = self.root.join(STAGING_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let tmp = staging.join(uuid::Uuid::new_v4().to_string());
        tokio::fs::write(&tmp, value).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!("[broker] wrote storage entry {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let dir = match prefix.trim_end_matches('/') {
            "" => self.root.clone(),
            trimmed => self.path_for(trimmed)?,
        };
        let mut reader = match tokio::fs::read_dir(&dir).await {
            Ok(reader) => reader,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut keys = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            keys.push(entry.file_name().to_string_lossy().into_owned());
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_get_missing_key() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_list_is_relative_and_shallow() {
        let storage = MemoryStorage::new();
        storage.put("roles/b", b"2".to_vec()).await.unwrap();
        storage.put("roles/a", b"1".to_vec()).await.unwrap();
        storage.put("roles/a/nested", b"3".to_vec()).await.unwrap();
        storage.put("users", b"{}".to_vec()).await.unwrap();

        let keys = storage.list("roles/").await.unwrap();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_memory_failure_switches() {
        let storage = MemoryStorage::new();
        storage.fail_put(true);
        assert!(matches!(
            storage.put("users", Vec::new()).await,
            Err(StorageError::Io(_))
        ));

        storage.fail_put(false);
        storage.put("users", Vec::new()).await.unwrap();

        storage.fail_get(true);
        assert!(storage.get("users").await.is_err());
        storage.fail_delete(true);
        assert!(storage.delete("users").await.is_err());
        storage.fail_list(true);
        assert!(storage.list("roles/").await.is_err());
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let storage = MemoryStorage::new();
        put_json(&storage, "config", &vec![1, 2, 3]).await.unwrap();
        let value: Option<Vec<u8>> = get_json(&storage, "config").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        storage.put("config", b"not json".to_vec()).await.unwrap();
        let result: StorageResult<Option<Vec<u8>>> = get_json(&storage, "config").await;
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_file_storage_put_get_list_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());

        storage.put("roles/billing", b"{}".to_vec()).await.unwrap();
        storage.put("roles/audit", b"{}".to_vec()).await.unwrap();
        storage.put("users", b"{}".to_vec()).await.unwrap();

        assert_eq!(
            storage.get("roles/billing").await.unwrap(),
            Some(b"{}".to_vec())
        );
        assert_eq!(
            storage.list("roles/").await.unwrap(),
            vec!["audit".to_string(), "billing".to_string()]
        );

        storage.delete("roles/billing").await.unwrap();
        storage.delete("roles/billing").await.unwrap();
        assert_eq!(storage.get("roles/billing").await.unwrap(), None);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.get("roles/../../etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.put(".tmp/entry", Vec::new()).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_file_storage_keeps_dotted_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        storage.put("roles/a.b", b"1".to_vec()).await.unwrap();
        storage.put("roles/a", b"2".to_vec()).await.unwrap();

        assert_eq!(storage.get("roles/a.b").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(storage.list("roles/").await.unwrap(), vec!["a", "a.b"]);
        assert_eq!(storage.list("").await.unwrap(), Vec::<String>::new());
    }
}
