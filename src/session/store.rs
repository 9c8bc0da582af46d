//! Durable key → value storage for credential bundles.
//!
//! # Responsibilities
//! - Abstract the host's storage API behind an async trait
//! - Provide an in-memory store and a JSON file store
//!
//! # Design Decisions
//! - Values are opaque JSON; SessionGuard owns decoding and validation
//! - File writes go to a temporary sibling and are renamed into place, so a
//!   crash never leaves a half-written file

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by credential stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// A thread-safe in-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.inner.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }
}

/// A store persisted as one JSON object in a file.
pub struct FileStore {
    path: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Map<String, Value>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, map: &Map<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(map)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        tracing::debug!(path = ?self.path, entries = map.len(), "Saved credential store");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let map = self.load().await?;
        Ok(map.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        if map.remove(key).is_some() {
            self.save(&map).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_operations() {
        let store = MemoryStore::new();
        assert!(store.get("session").await.unwrap().is_none());

        store.set("session", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("session").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.len(), 1);

        store.remove("session").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persistence() {
        let path = std::env::temp_dir().join(format!("session_relay_store_{}.json", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let store = FileStore::new(&path);
        assert!(store.get("session").await.unwrap().is_none());
        store.set("session", json!({"access_token": "at"})).await.unwrap();
        store.set("other", json!(2)).await.unwrap();

        // A fresh instance sees what the first one wrote
        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.get("session").await.unwrap(),
            Some(json!({"access_token": "at"}))
        );

        reopened.remove("session").await.unwrap();
        assert!(store.get("session").await.unwrap().is_none());
        assert_eq!(store.get("other").await.unwrap(), Some(json!(2)));

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let path = std::env::temp_dir().join(format!("session_relay_corrupt_{}.json", std::process::id()));
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("session").await, Err(StoreError::Encoding(_))));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
