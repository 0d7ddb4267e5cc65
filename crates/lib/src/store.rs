//! Durable key-value storage for conversations.
//!
//! The store is the only resource shared between widget instances, so every key is
//! partitioned by instance. Writes are last-write-wins with no transaction spanning
//! the message-list and thread-id entries.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::message::Message;

const BASE_MESSAGES_KEY: &str = "chatMessages";
const BASE_THREAD_ID_KEY: &str = "chatThreadId";
const STORE_FILE_NAME: &str = "store.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Synchronous string key-value store (the browser's local storage, or a file).
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store. Clones share the same map, like two widgets on one page.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        g.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        g.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut g = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        g.remove(key);
        Ok(())
    }
}

/// Directory-backed store: one JSON object file, rewritten on every mutation.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store in `dir`; a missing or unreadable file starts empty.
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(STORE_FILE_NAME);
        let entries = match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
                log::warn!("ignoring unreadable store {}: {}", path.display(), e);
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let g = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        g.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut g = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        g.insert(key.to_string(), value.to_string());
        self.save(&g)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut g = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if g.remove(key).is_none() {
            return Ok(());
        }
        self.save(&g)
    }
}

/// A store bound to one widget instance's message-list and thread-id keys.
///
/// Write failures are logged and swallowed; persistence never aborts a chat turn.
#[derive(Clone)]
pub struct ChatStorage {
    store: Arc<dyn DurableStore>,
    messages_key: String,
    thread_id_key: String,
}

/// `base` alone, or `base_<instance>` when the widget has an instance key.
pub fn instance_storage_key(base: &str, instance_key: Option<&str>) -> String {
    match instance_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(k) => format!("{}_{}", base, k),
        None => base.to_string(),
    }
}

impl ChatStorage {
    pub fn new(store: Arc<dyn DurableStore>, instance_key: Option<&str>) -> Self {
        Self {
            store,
            messages_key: instance_storage_key(BASE_MESSAGES_KEY, instance_key),
            thread_id_key: instance_storage_key(BASE_THREAD_ID_KEY, instance_key),
        }
    }

    pub fn messages_key(&self) -> &str {
        &self.messages_key
    }

    pub fn thread_id_key(&self) -> &str {
        &self.thread_id_key
    }

    /// Stored messages, or empty when absent or corrupt.
    pub fn load_messages(&self) -> Vec<Message> {
        let Some(raw) = self.store.get(&self.messages_key) else {
            return Vec::new();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("failed to parse stored messages ({}): {}", self.messages_key, e);
            Vec::new()
        })
    }

    pub fn save_messages(&self, messages: &[Message]) {
        let result = serde_json::to_string(messages)
            .map_err(StoreError::from)
            .and_then(|json| self.store.set(&self.messages_key, &json));
        if let Err(e) = result {
            log::warn!("failed to persist messages ({}): {}", self.messages_key, e);
        }
    }

    pub fn load_thread_id(&self) -> Option<String> {
        self.store
            .get(&self.thread_id_key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    /// Persist the thread id; `None` removes the entry.
    pub fn save_thread_id(&self, thread_id: Option<&str>) {
        let result = match thread_id {
            Some(id) => self.store.set(&self.thread_id_key, id),
            None => self.store.remove(&self.thread_id_key),
        };
        if let Err(e) = result {
            log::warn!("failed to persist thread id ({}): {}", self.thread_id_key, e);
        }
    }

    /// Remove both entries for this instance.
    pub fn clear(&self) {
        for key in [&self.messages_key, &self.thread_id_key] {
            if let Err(e) = self.store.remove(key) {
                log::warn!("failed to clear {}: {}", key, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("embedchat-store-test-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn keys_are_partitioned_by_instance() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let a = ChatStorage::new(store.clone(), Some("a"));
        let plain = ChatStorage::new(store, None);
        assert_eq!(a.messages_key(), "chatMessages_a");
        assert_eq!(a.thread_id_key(), "chatThreadId_a");
        assert_eq!(plain.messages_key(), "chatMessages");
        assert_eq!(plain.thread_id_key(), "chatThreadId");
    }

    #[test]
    fn messages_and_thread_round_trip_and_clear() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::new());
        let storage = ChatStorage::new(store, Some("w"));
        let msgs = vec![Message::user("hi"), Message::agent("hello")];
        storage.save_messages(&msgs);
        storage.save_thread_id(Some("t-1"));
        assert_eq!(storage.load_messages(), msgs);
        assert_eq!(storage.load_thread_id().as_deref(), Some("t-1"));

        storage.save_thread_id(None);
        assert_eq!(storage.load_thread_id(), None);

        storage.clear();
        assert!(storage.load_messages().is_empty());
    }

    #[test]
    fn corrupt_messages_entry_loads_empty() {
        let store = MemoryStore::new();
        store.set("chatMessages", "{not json").unwrap();
        let storage = ChatStorage::new(Arc::new(store), None);
        assert!(storage.load_messages().is_empty());
    }

    #[test]
    fn file_store_persists_across_open() {
        let dir = temp_dir();
        {
            let store = FileStore::open(&dir);
            store.set("k", "v").unwrap();
            store.set("gone", "x").unwrap();
            store.remove("gone").unwrap();
        }
        let reopened = FileStore::open(&dir);
        assert_eq!(reopened.get("k").as_deref(), Some("v"));
        assert_eq!(reopened.get("gone"), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_store_ignores_corrupt_file() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(STORE_FILE_NAME), "[1, 2").unwrap();
        let store = FileStore::open(&dir);
        assert_eq!(store.get("anything"), None);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
