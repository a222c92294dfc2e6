//! String key/value port: UI preferences, and the whole dataset for the
//! on-device backend.

use crate::errors::{AppError, AppResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
    /// Stored keys starting with `prefix`, in key order.
    fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;
}

fn matching_keys(entries: &BTreeMap<String, String>, prefix: &str) -> Vec<String> {
    entries
        .keys()
        .filter(|k| k.starts_with(prefix))
        .cloned()
        .collect()
}

fn lock<T>(m: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| AppError::Other("key/value store lock poisoned".into()))
}

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        lock(&self.entries)?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        lock(&self.entries)?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(matching_keys(&*lock(&self.entries)?, prefix))
    }
}

/// One JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Load `path` if it exists; a missing file is an empty store.
    pub fn open(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> AppResult<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let mut entries = lock(&self.entries)?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let mut entries = lock(&self.entries)?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        Ok(matching_keys(&*lock(&self.entries)?, prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips() {
        let kv = MemoryStore::new();
        assert_eq!(kv.get("k").unwrap(), None);
        kv.set("k", "v").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("v"));
        kv.remove("k").unwrap();
        assert_eq!(kv.get("k").unwrap(), None);
    }

    #[test]
    fn keys_are_listed_by_prefix() {
        let kv = MemoryStore::new();
        kv.set("todos_bob", "[]").unwrap();
        kv.set("projects", "[]").unwrap();
        kv.set("todos_alice", "[]").unwrap();
        assert_eq!(kv.keys_with_prefix("todos_").unwrap(), vec!["todos_alice", "todos_bob"]);
    }

    #[test]
    fn file_store_persists_across_reopen() {
        let path = std::env::temp_dir().join("zensession_kv_test.json");
        let _ = fs::remove_file(&path);

        {
            let kv = FileStore::open(&path).unwrap();
            kv.set("expandedProjectId", "3").unwrap();
            kv.set("activeSessionId", "9").unwrap();
            kv.remove("activeSessionId").unwrap();
        }

        let kv = FileStore::open(&path).unwrap();
        assert_eq!(kv.get("expandedProjectId").unwrap().as_deref(), Some("3"));
        assert_eq!(kv.get("activeSessionId").unwrap(), None);
        let _ = fs::remove_file(&path);
    }
}
