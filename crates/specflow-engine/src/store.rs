//! Durable key-value storage for workflow state

use std::collections::HashMap;
use std::fs;
use std::io;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use specflow_utils::atomic_write::write_file_atomic;
use specflow_utils::error::StoreError;

/// Record name under which the engine persists its state.
pub const WORKFLOW_STATE_KEY: &str = "workflow-state";

/// A string-valued store of named records.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StoreError` if the record exists but cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// # Errors
    ///
    /// Returns `StoreError` if the record cannot be written.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing record is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the record exists but cannot be removed.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

fn check_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey {
            key: key.to_string(),
        })
    }
}

/// One `<key>.json` file per record in a directory. Writes are atomic.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: Utf8PathBuf,
}

impl FileStore {
    /// The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<Utf8PathBuf, StoreError> {
        check_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path(key)?;
        write_file_atomic(&path, value).map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: format!("{e:#}"),
        })?;
        debug!(key, path = %path, bytes = value.len(), "Record written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Write {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// In-process store, used by tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, String>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        *self
            .writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        check_key(key)?;
        Ok(self.records().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.records().insert(key.to_string(), value.to_string());
        *self
            .writes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        check_key(key)?;
        self.records().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_store() -> (TempDir, FileStore) {
        let temp = TempDir::new().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().join("state")).unwrap();
        (temp, FileStore::new(dir))
    }

    #[test]
    fn test_file_store_round_trip_and_remove() {
        let (_temp, store) = file_store();
        assert_eq!(store.get(WORKFLOW_STATE_KEY).unwrap(), None);

        store.put(WORKFLOW_STATE_KEY, "{\"a\":1}").unwrap();
        assert_eq!(
            store.get(WORKFLOW_STATE_KEY).unwrap().as_deref(),
            Some("{\"a\":1}")
        );
        assert!(store.dir().join("workflow-state.json").exists());

        store.remove(WORKFLOW_STATE_KEY).unwrap();
        store.remove(WORKFLOW_STATE_KEY).unwrap();
        assert_eq!(store.get(WORKFLOW_STATE_KEY).unwrap(), None);
    }

    #[test]
    fn test_keys_cannot_escape_the_directory() {
        let (_temp, store) = file_store();
        for key in ["../x", "a/b", "", "x.json"] {
            assert!(matches!(
                store.put(key, "v"),
                Err(StoreError::InvalidKey { .. })
            ));
        }
    }

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        store.put("k", "1").unwrap();
        store.put("k", "2").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("2"));
        assert_eq!(store.write_count(), 2);
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }
}
