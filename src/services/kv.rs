//! [`KeyValueStore`] implementations.

use super::KeyValueStore;
use crate::error::ServiceError;
use crate::report::{record_key, AnalysisRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// One JSON file per key inside a directory.
///
/// Writes go to a temporary file that is then renamed over the target, so a
/// reader never sees a half-written record.
#[derive(Debug, Clone)]
pub struct FileKvStore {
    dir: PathBuf,
}

impl FileKvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `key`. `:` is not portable in file names, so it is
    /// percent-encoded, along with `%` itself to keep the mapping one-to-one.
    fn path_for(&self, key: &str) -> Result<PathBuf, ServiceError> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains(['/', '\\'])
        {
            return Err(ServiceError::InvalidPath(key.to_string()));
        }
        let encoded = key.replace('%', "%25").replace(':', "%3A");
        Ok(self.dir.join(format!("{encoded}.json")))
    }
}

#[async_trait]
impl KeyValueStore for FileKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        let path = self.path_for(key)?;
        let io_err = |source| ServiceError::Io {
            path: path.clone(),
            source,
        };

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;

        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, value).await.map_err(io_err)?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(io_err)?;

        debug!("Stored key {} → {}", key, path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(ServiceError::Io { path, source }),
        }
    }
}

/// Process-local store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<(), ServiceError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ServiceError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }
}

/// Fetch and decode the record for run `id`.
pub async fn load_record(
    store: &dyn KeyValueStore,
    id: &str,
) -> Result<Option<AnalysisRecord>, ServiceError> {
    match store.get(&record_key(id)).await? {
        Some(value) => Ok(Some(serde_json::from_str(&value)?)),
        None => Ok(None),
    }
}
