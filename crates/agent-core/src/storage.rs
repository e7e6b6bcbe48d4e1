use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that the value stored under `key` was written or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
    pub key: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("stored value for `{key}` is not valid JSON: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
}

/// Key/value persistence with change notification.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;

    /// Lock that callers hold across a get-modify-set cycle. Every handle to
    /// the same backend returns the same lock.
    fn write_lock(&self) -> Arc<Mutex<()>>;
}

fn notify(tx: &broadcast::Sender<StorageChange>, key: &str) {
    // Nobody listening is the common case outside the UI.
    let _ = tx.send(StorageChange {
        key: key.to_string(),
    });
}

/// Process-local store, used for tests and ephemeral sessions.
#[derive(Clone)]
pub struct MemoryStore {
    values: Arc<Mutex<HashMap<String, Value>>>,
    changes: broadcast::Sender<StorageChange>,
    writes: Arc<Mutex<()>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            changes,
            writes: Arc::new(Mutex::new(())),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values.lock().await.insert(key.to_string(), value);
        notify(&self.changes, key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.values.lock().await.remove(key).is_some() {
            notify(&self.changes, key);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    fn write_lock(&self) -> Arc<Mutex<()>> {
        self.writes.clone()
    }
}

/// One pretty-printed JSON file per key under a directory. Writes go to a
/// temp file in the same directory and are renamed into place, so a reader
/// sees either the old or the new value.
#[derive(Clone)]
pub struct JsonFileStore {
    root: PathBuf,
    changes: broadcast::Sender<StorageChange>,
    writes: Arc<Mutex<()>>,
}

impl JsonFileStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| io_error(&root, source))?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            root,
            changes,
            writes: Arc::new(Mutex::new(())),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(io_error(&path, source)),
        };
        let value = serde_json::from_slice(&bytes).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let root = self.root.clone();
        let bytes = serde_json::to_vec_pretty(&value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let mut tmp = NamedTempFile::new_in(&root).map_err(|source| io_error(&root, source))?;
            tmp.write_all(&bytes)
                .map_err(|source| io_error(tmp.path(), source))?;
            tmp.as_file()
                .sync_all()
                .map_err(|source| io_error(tmp.path(), source))?;
            tmp.persist(&target)
                .map_err(|err| io_error(&target, err.error))?;
            Ok(())
        })
        .await
        .map_err(|err| io_error(&path, std::io::Error::new(std::io::ErrorKind::Other, err)))??;

        debug!(target: "agent_core", key, path = %path.display(), "persisted value");
        notify(&self.changes, key);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                notify(&self.changes, key);
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!(target: "agent_core", key, error = %source, "failed to remove value");
                Err(io_error(&path, source))
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
        self.changes.subscribe()
    }

    fn write_lock(&self) -> Arc<Mutex<()>> {
        self.writes.clone()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}
