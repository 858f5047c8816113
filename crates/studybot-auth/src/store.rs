//! Persistent key-value credential storage
//!
//! The credential record is kept as three independent string entries, so the
//! store interface is a plain key-value get/set/clear.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use studybot_core::{Result, StreamError};
use tokio::sync::Mutex;
use tracing::debug;

/// Key-value store holding the credential entries
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read one entry; `Ok(None)` when absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write one entry, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove one entry; removing an absent key is not an error
    async fn clear(&self, key: &str) -> Result<()>;
}

/// Process-local store, used by tests and short-lived tools
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: DashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON-object file store
///
/// Every write goes to a sibling `.tmp` file which is then renamed over the
/// target, so a crash mid-write never leaves a truncated credential file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `~/.studybot/credentials.json`
    pub fn default_location() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            StreamError::Config("Could not determine home directory".to_string())
        })?;
        Ok(Self::new(home.join(".studybot").join("credentials.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_entries(&self) -> Result<Map<String, Value>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Credential file does not exist: {}", self.path.display());
                return Ok(Map::new());
            }
            Err(e) => return Err(e.into()),
        };

        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&contents)? {
            Value::Object(map) => Ok(map),
            _ => Err(StreamError::Store(format!(
                "Credential file {} is not a JSON object",
                self.path.display()
            ))),
        }
    }

    async fn write_entries(&self, entries: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut temp_path = self.path.as_os_str().to_owned();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        let contents = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&temp_path, contents).await?;
        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;

        match entries.get(key) {
            Some(Value::String(value)) => Ok(Some(value.clone())),
            Some(Value::Null) | None => Ok(None),
            Some(other) => Ok(Some(other.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        entries.insert(key.to_string(), Value::String(value.to_string()));
        self.write_entries(&entries).await
    }

    async fn clear(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get("accessToken").await.unwrap(), None);

        store.set("accessToken", "abc").await.unwrap();
        assert_eq!(store.get("accessToken").await.unwrap(), Some("abc".to_string()));

        store.clear("accessToken").await.unwrap();
        store.clear("accessToken").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("credentials.json");

        let store = FileCredentialStore::new(&path);
        store.set("refreshToken", "r-1").await.unwrap();
        store.set("accessTokenExpiresAt", "1700000000000").await.unwrap();

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.get("refreshToken").await.unwrap(), Some("r-1".to_string()));
        assert_eq!(
            reopened.get("accessTokenExpiresAt").await.unwrap(),
            Some("1700000000000".to_string())
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_missing_file_reads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("absent.json"));

        assert_eq!(store.get("accessToken").await.unwrap(), None);
        store.clear("accessToken").await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_clear_removes_only_that_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(temp_dir.path().join("credentials.json"));

        store.set("accessToken", "a").await.unwrap();
        store.set("refreshToken", "r").await.unwrap();
        store.clear("accessToken").await.unwrap();

        assert_eq!(store.get("accessToken").await.unwrap(), None);
        assert_eq!(store.get("refreshToken").await.unwrap(), Some("r".to_string()));
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_object_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.get("accessToken").await, Err(StreamError::Store(_))));
    }

    #[tokio::test]
    async fn test_file_store_invalid_json_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("credentials.json");
        std::fs::write(&path, "not valid json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(
            store.get("accessToken").await,
            Err(StreamError::Serialization(_))
        ));
    }
}
