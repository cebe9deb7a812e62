//! File-backed [`KeyValueStore`].
//!
//! The whole store is a single JSON object (`{"key": "value", …}`).  Every
//! write serialises the full map to `<file>.tmp` and renames it over the
//! target, so a reader (or a crash) never sees a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{KeyValueStore, StoreError};

/// Persistent store kept in one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store.  A file that cannot be read or
    /// parsed is logged and also treated as empty; it is overwritten on the
    /// next successful write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = Self::load_values(&path);
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_values(path: &Path) -> BTreeMap<String, String> {
        if !path.exists() {
            return BTreeMap::new();
        }
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|e| {
                log::warn!("store: {} is not valid JSON ({e}); starting empty", path.display());
                BTreeMap::new()
            }),
            Err(e) => {
                log::warn!("store: cannot read {} ({e}); starting empty", path.display());
                BTreeMap::new()
            }
        }
    }

    fn write_atomically(&self, values: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(values)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Lock the map, recovering it from a poisoned mutex.
    fn lock_values(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `mutate` to a copy of the map, persist it, then commit it.
    ///
    /// On a failed write the in-memory map is left untouched.
    fn update(
        &self,
        mutate: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let mut guard = self.lock_values();
        let mut next = guard.clone();
        mutate(&mut next);
        if next == *guard {
            return Ok(());
        }
        self.write_atomically(&next)?;
        *guard = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock_values().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempdir().expect("temp dir");
        let store = JsonFileStore::open(dir.path().join("storage.json"));
        assert!(store.get("anything").is_none());
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("storage.json");

        let store = JsonFileStore::open(&path);
        store.set("gemini_api_key", "AIza-test-key-123").unwrap();
        store.set("ai_teacher_chat", "[]").unwrap();
        drop(store);

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get("gemini_api_key").as_deref(),
            Some("AIza-test-key-123")
        );
        assert_eq!(reopened.get("ai_teacher_chat").as_deref(), Some("[]"));
    }

    #[test]
    fn remove_is_persisted_and_idempotent() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("storage.json");

        let store = JsonFileStore::open(&path);
        store.set("k", "v").unwrap();
        store.remove("k").unwrap();
        store.remove("k").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert!(reopened.get("k").is_none());
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("storage.json");

        let store = JsonFileStore::open(&path);
        store.set("k", "v").unwrap();

        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn corrupt_file_starts_empty_and_is_overwritten() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.get("k").is_none());

        store.set("k", "v").unwrap();
        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn poisoned_lock_still_serves_values() {
        let dir = tempdir().expect("temp dir");
        let store = std::sync::Arc::new(JsonFileStore::open(dir.path().join("storage.json")));
        store.set("k", "v").unwrap();

        let poisoner = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.values.lock().unwrap();
            panic!("writer died while holding the lock");
        })
        .join();
        assert!(store.values.is_poisoned());

        assert_eq!(store.get("k").as_deref(), Some("v"));
        store.set("k2", "w").unwrap();
        assert_eq!(store.get("k2").as_deref(), Some("w"));
    }
}
