//! Persistent key-value storage scoped to one workspace.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Durable get/set/delete by key.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: DashMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.values.remove(key).is_some())
    }
}

/// One JSON object per workspace, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store for `workspace_id` under `state_dir`.
    pub fn new(state_dir: impl AsRef<Path>, workspace_id: &str) -> Self {
        let file = format!("{}.json", sanitize(workspace_id));
        Self {
            path: state_dir.as_ref().join(file),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StoreResult<Map<String, Value>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(Map::new()),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes)? {
                Value::Object(map) => Ok(map),
                _ => Ok(Map::new()),
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Map::new()),
            Err(source) => Err(self.io_error(source)),
        }
    }

    async fn save(&self, map: Map<String, Value>) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| self.io_error(source))?;
        }
        let bytes = serde_json::to_vec_pretty(&Value::Object(map))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| self.io_error(source))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.insert(key.to_string(), value);
        self.save(map).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let existed = map.remove(key).is_some();
        if existed {
            self.save(map).await?;
        }
        Ok(existed)
    }
}

/// Keep workspace ids usable as file names.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.unwrap().is_none());
        store.set("k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path(), "shop/web");
        assert!(store.path().ends_with("shop_web.json"));

        store.set("bootstrap", json!({"completed": true})).await.unwrap();
        store.set("other", json!(3)).await.unwrap();

        let reopened = JsonFileStore::new(dir.path(), "shop/web");
        assert_eq!(
            reopened.get("bootstrap").await.unwrap(),
            Some(json!({"completed": true}))
        );
        assert!(reopened.delete("bootstrap").await.unwrap());
        assert!(reopened.get("bootstrap").await.unwrap().is_none());
        assert_eq!(reopened.get("other").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"), "ws");
        assert!(store.get("anything").await.unwrap().is_none());
        assert!(!store.delete("anything").await.unwrap());
    }
}
