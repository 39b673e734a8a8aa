//! In-memory storage backend

use crate::storage::{KvEvent, KvOp, Storage, StorageError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// B-tree map behind a read/write lock, with broadcast change events.
///
/// The lock is held only for the map operation itself; events are published
/// after the write completes.
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, serde_json::Value>>,
    events: broadcast::Sender<KvEvent>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            entries: RwLock::new(BTreeMap::new()),
            events,
        }
    }

    fn publish(&self, key: &str, op: KvOp, value: Option<serde_json::Value>) {
        // No receivers is fine; send only fails when nobody is watching.
        let _ = self.events.send(KvEvent {
            key: key.to_string(),
            op,
            value,
        });
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<serde_json::Value, StorageError> {
        self.entries
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), StorageError> {
        self.entries
            .write()
            .insert(key.to_string(), value.clone());
        self.publish(key, KvOp::Set, Some(value));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), StorageError> {
        {
            let mut entries = self.entries.write();
            if entries.contains_key(key) {
                return Err(StorageError::AlreadyExists(key.to_string()));
            }
            entries.insert(key.to_string(), value.clone());
        }
        self.publish(key, KvOp::Set, Some(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let removed = self.entries.write().remove(key);
        if removed.is_none() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.publish(key, KvOp::Delete, None);
        Ok(())
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn watch(&self) -> broadcast::Receiver<KvEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStorage::new();

        store.set("boxes/b1", json!({"label": "one"})).await.unwrap();
        assert_eq!(
            store.get("boxes/b1").await.unwrap(),
            json!({"label": "one"})
        );

        store.delete("boxes/b1").await.unwrap();
        assert!(matches!(
            store.get("boxes/b1").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_set_if_absent() {
        let store = MemoryStorage::new();

        store.set_if_absent("users/a", json!(1)).await.unwrap();
        assert!(matches!(
            store.set_if_absent("users/a", json!(2)).await,
            Err(StorageError::AlreadyExists(_))
        ));
        // Losing writer did not overwrite.
        assert_eq!(store.get("users/a").await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_keys_prefix() {
        let store = MemoryStorage::new();
        store.set("boxes/b1", json!(1)).await.unwrap();
        store.set("boxes/b2", json!(2)).await.unwrap();
        store.set("things/t1", json!(3)).await.unwrap();

        assert_eq!(store.keys("boxes/").await.unwrap(), vec!["boxes/b1", "boxes/b2"]);
        assert_eq!(store.keys("").await.unwrap().len(), 3);
        assert!(store.keys("mails/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_events() {
        let store = MemoryStorage::new();
        let mut events = store.watch();

        store.set("boxes/b1", json!(1)).await.unwrap();
        store.delete("boxes/b1").await.unwrap();

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.key, "boxes/b1");
        assert_eq!(ev.op, KvOp::Set);
        assert_eq!(ev.value, Some(json!(1)));

        let ev = events.recv().await.unwrap();
        assert_eq!(ev.op, KvOp::Delete);
        assert_eq!(ev.value, None);
    }

    #[tokio::test]
    async fn test_concurrent_register_race() {
        use std::sync::Arc;

        // Two concurrent insert-if-absent calls for the same key: exactly one
        // wins, the loser never overwrites.
        let store = Arc::new(MemoryStorage::new());

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.set_if_absent("users/race", json!(i)).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
