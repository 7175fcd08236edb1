use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

/// Storage key for the raw bearer token
pub const AUTH_TOKEN_KEY: &str = "authToken";
/// Storage key for the serialized [`Session`](playconnect_common::models::auth::Session)
pub const USER_DATA_KEY: &str = "userData";
/// Convenience copy of the user id
pub const USER_ID_KEY: &str = "user_id";

/// All keys owned by the session; cleared together on logout.
pub const SESSION_KEYS: [&str; 3] = [AUTH_TOKEN_KEY, USER_DATA_KEY, USER_ID_KEY];

/// Persisted string key-value storage.
///
/// Only [`SessionManager`](crate::session::SessionManager) writes to it.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-lifetime store, lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The file is re-read on every access so several processes sharing one
/// path see each other's logins and logouts.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> HashMap<String, String> {
        // Unreadable or corrupt files behave like an empty store
        std::fs::read(&self.path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
            .unwrap_or_default()
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock().unwrap();
        self.read_all().remove(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut entries = self.read_all();
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut entries = self.read_all();
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.write_all(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get(AUTH_TOKEN_KEY), None);
        store.set(AUTH_TOKEN_KEY, "abc").unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("abc"));
        store.remove(AUTH_TOKEN_KEY).unwrap();
        store.remove(AUTH_TOKEN_KEY).unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY), None);
    }

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        store.set(USER_ID_KEY, "12").unwrap();
        store.set(AUTH_TOKEN_KEY, "tok").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get(USER_ID_KEY).as_deref(), Some("12"));
        assert_eq!(reopened.get(AUTH_TOKEN_KEY).as_deref(), Some("tok"));

        reopened.remove(USER_ID_KEY).unwrap();
        assert_eq!(store.get(USER_ID_KEY), None);
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("tok"));
    }

    #[test]
    fn test_file_store_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileStore::new(&path);
        assert_eq!(store.get(AUTH_TOKEN_KEY), None);
        store.set(AUTH_TOKEN_KEY, "fresh").unwrap();
        assert_eq!(store.get(AUTH_TOKEN_KEY).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_file_store_remove_missing_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::new(&path);
        store.remove(USER_DATA_KEY).unwrap();
        assert!(!path.exists());
    }
}
