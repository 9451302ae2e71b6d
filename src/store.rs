//! Durable `lookup_key -> local_name` store.
//!
//! The store is the only cache that survives process restarts; the
//! in-memory queue is just a coalescing buffer. Every entry is supposed to
//! correspond to a file on disk, and first-use cleanup enforces that by
//! clearing entries together with their backing files.
//!
//! The API is deliberately infallible at the edge: store writes are
//! best-effort bookkeeping, and an IO failure must never fail a download
//! that already succeeded. Failures are logged and swallowed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Key-value contract for the persisted name mapping.
///
/// Implementations must be safe to call from the scheduler's execution
/// context; no other context mutates the store.
pub trait KeyStore: Send + Sync {
    /// Returns the local name stored under a key.
    fn get(&self, key: &str) -> Option<String>;

    /// Stores a local name under a key, replacing any previous value.
    fn put(&self, key: &str, local_name: &str);

    /// Removes a key. A no-op for absent keys.
    fn remove(&self, key: &str);

    /// Returns all `(key, local_name)` pairs.
    fn entries(&self) -> Vec<(String, String)>;
}

/// On-disk JSON serialization for [`JsonFileStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    entries: HashMap<String, String>,
}

/// [`KeyStore`] persisted as a single JSON namespace file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Opens (or initializes) a store at the given file path.
    ///
    /// A missing or unreadable file yields an empty store; the file is
    /// created on the first mutation.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoreFile>(&raw) {
                Ok(file) => file.entries,
                Err(error) => {
                    warn!(path = %path.display(), %error, "store file corrupt, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        debug!(path = %path.display(), entry_count = entries.len(), "opened key store");
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Rewrites the backing file from the given snapshot.
    fn persist(&self, entries: &HashMap<String, String>) {
        let file = StoreFile {
            entries: entries.clone(),
        };
        let serialized = match serde_json::to_string_pretty(&file) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(path = %self.path.display(), %error, "failed to serialize store");
                return;
            }
        };
        if let Some(parent) = self.path.parent() {
            if let Err(error) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), %error, "failed to create store directory");
                return;
            }
        }
        if let Err(error) = std::fs::write(&self.path, serialized) {
            warn!(path = %self.path.display(), %error, "failed to write store file");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned lock only means a panic mid-bookkeeping; the map
        // itself is always in a usable state.
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: &str, local_name: &str) {
        let mut entries = self.lock();
        entries.insert(key.to_string(), local_name.to_string());
        self.persist(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries);
        }
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .map(|(key, name)| (key.clone(), name.clone()))
            .collect()
    }
}

/// In-memory [`KeyStore`] for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn put(&self, key: &str, local_name: &str) {
        self.lock().insert(key.to_string(), local_name.to_string());
    }

    fn remove(&self, key: &str) {
        self.lock().remove(key);
    }

    fn entries(&self) -> Vec<(String, String)> {
        self.lock()
            .iter()
            .map(|(key, name)| (key.clone(), name.clone()))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.get("dlqkey_dlq_1.mp4").is_none());

        store.put("dlqkey_dlq_1.mp4", "dlq_1.mp4");
        assert_eq!(store.get("dlqkey_dlq_1.mp4").as_deref(), Some("dlq_1.mp4"));

        store.remove("dlqkey_dlq_1.mp4");
        assert!(store.get("dlqkey_dlq_1.mp4").is_none());
    }

    #[test]
    fn test_json_store_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        {
            let store = JsonFileStore::open(&path);
            store.put("dlqkey_dlq_1.mp4", "dlq_1.mp4");
            store.put("dlqkey_dlq_2.png", "dlq_2.png");
        }

        let reopened = JsonFileStore::open(&path);
        assert_eq!(
            reopened.get("dlqkey_dlq_1.mp4").as_deref(),
            Some("dlq_1.mp4")
        );
        let mut entries = reopened.entries();
        entries.sort();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_json_store_remove_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path);
        store.put("dlqkey_dlq_1.mp4", "dlq_1.mp4");
        store.remove("dlqkey_dlq_1.mp4");

        let reopened = JsonFileStore::open(&path);
        assert!(reopened.get("dlqkey_dlq_1.mp4").is_none());
        assert!(reopened.entries().is_empty());
    }

    #[test]
    fn test_json_store_remove_absent_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json"));
        store.remove("dlqkey_missing");
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_json_store_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = JsonFileStore::open(&path);
        assert!(store.entries().is_empty());
    }
}
