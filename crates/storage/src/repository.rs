use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::progress_store::ProgressStore;

/// How many change notifications a slow subscriber may lag behind.
const EVENT_CAPACITY: usize = 64;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Set,
    Removed,
}

/// Notification sent to subscribers after a key changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    pub change: StoreChange,
}

/// String key-value store holding all persisted funnel state.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be stored.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// All keys currently stored, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Receive a `StoreEvent` for every later `set` or `remove`.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
    events: broadcast::Sender<StoreEvent>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(Mutex::new(BTreeMap::new())),
            events,
        }
    }

    fn notify(&self, key: &str, change: StoreChange) {
        // No subscribers is fine.
        let _ = self.events.send(StoreEvent {
            key: key.to_owned(),
            change,
        });
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut guard = self
                .entries
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.insert(key.to_owned(), value.to_owned());
        }
        self.notify(key, StoreChange::Set);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let removed = {
            let mut guard = self
                .entries
                .lock()
                .map_err(|e| StorageError::Connection(e.to_string()))?;
            guard.remove(key).is_some()
        };
        if removed {
            self.notify(key, StoreChange::Removed);
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.keys().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// Handle to the configured backend, shared by every service.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()))
    }

    /// Typed access to progress, transcripts and legacy flags.
    #[must_use]
    pub fn progress(&self) -> ProgressStore {
        ProgressStore::new(Arc::clone(&self.kv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_remove_round_trip() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        store.remove("a").await.unwrap();
        store.remove("missing").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let store = InMemoryStore::new();
        let mut events = store.subscribe();
        store.set("unlocked_level", "2").await.unwrap();
        store.remove("unlocked_level").await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent {
                key: "unlocked_level".into(),
                change: StoreChange::Set
            }
        );
        assert_eq!(events.recv().await.unwrap().change, StoreChange::Removed);
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.set("k", "v").await.unwrap();
        assert_eq!(other.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
