//! In-memory tree store used for local runs and tests.
//!
//! The whole tree is one `serde_json::Value` behind a mutex, so every
//! operation, including [`TreeStore::transaction`], is trivially
//! atomic. The remote adapter that replaces this in deployment must
//! provide the same per-node transactional guarantee.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::{StoreError, TreeStore, TxnUpdate};

pub struct MemoryTreeStore {
    root: Mutex<Value>,
    push_seq: AtomicU64,
}

impl MemoryTreeStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            push_seq: AtomicU64::new(0),
        }
    }

    fn segments(path: &str) -> Result<Vec<&str>, StoreError> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(StoreError::InvalidPath {
                path: path.to_string(),
                detail: "empty path".to_string(),
            });
        }
        Ok(segments)
    }

    fn read<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
        let mut node = root;
        for segment in segments {
            node = node.as_object()?.get(*segment)?;
        }
        Some(node)
    }

    /// Walk to the parent of the addressed node, creating intermediate
    /// objects, and return the final map together with the leaf key.
    fn write_slot<'a>(
        root: &'a mut Value,
        segments: &[&str],
    ) -> Result<(&'a mut Map<String, Value>, String), StoreError> {
        let mut node = root;
        for segment in &segments[..segments.len() - 1] {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = node
                .as_object_mut()
                .expect("just coerced to object")
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = node.as_object_mut().expect("just coerced to object");
        Ok((map, segments[segments.len() - 1].to_string()))
    }

    /// Chronologically sortable unique key: zero-padded millis, a
    /// process-wide sequence number, and a random tail so keys from
    /// different writers never collide.
    fn next_push_key(&self) -> String {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let seq = self.push_seq.fetch_add(1, Ordering::SeqCst);
        let tail = uuid::Uuid::new_v4().simple().to_string();
        format!("{millis:013}-{seq:08}-{}", &tail[..8])
    }
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = Self::segments(path)?;
        let root = self.root.lock().unwrap();
        Ok(Self::read(&root, &segments).cloned())
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = Self::segments(path)?;
        let mut root = self.root.lock().unwrap();
        let (map, key) = Self::write_slot(&mut root, &segments)?;
        map.insert(key, value);
        Ok(())
    }

    async fn update(
        &self,
        path: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let segments = Self::segments(path)?;
        let mut root = self.root.lock().unwrap();
        let (map, key) = Self::write_slot(&mut root, &segments)?;
        let node = map
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let target = node.as_object_mut().expect("just coerced to object");
        for (field, value) in fields {
            target.insert(field, value);
        }
        Ok(())
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = self.next_push_key();
        let child_path = format!("{}/{}", path.trim_end_matches('/'), key);
        self.set(&child_path, value).await?;
        Ok(key)
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let segments = Self::segments(path)?;
        let mut root = self.root.lock().unwrap();
        let (map, key) = Self::write_slot(&mut root, &segments)?;
        map.remove(&key);
        Ok(())
    }

    async fn transaction(&self, path: &str, mut update: TxnUpdate) -> Result<(), StoreError> {
        let segments = Self::segments(path)?;
        let mut root = self.root.lock().unwrap();
        let current = Self::read(&root, &segments).cloned();
        let next = update(current);
        let (map, key) = Self::write_slot(&mut root, &segments)?;
        match next {
            Some(value) => {
                map.insert(key, value);
            }
            None => {
                map.remove(&key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_nested_path() {
        let store = MemoryTreeStore::new();
        store
            .set("users/u1/displayName", json!("Asha"))
            .await
            .unwrap();
        assert_eq!(
            store.get("users/u1/displayName").await.unwrap(),
            Some(json!("Asha"))
        );
        assert_eq!(store.get("users/u1/email").await.unwrap(), None);
        assert_eq!(
            store.get("users/u1").await.unwrap(),
            Some(json!({"displayName": "Asha"}))
        );
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryTreeStore::new();
        store.set("users/u1", json!({"a": 1, "b": 2})).await.unwrap();

        let mut fields = Map::new();
        fields.insert("b".to_string(), json!(3));
        fields.insert("c".to_string(), json!(4));
        store.update("users/u1", fields).await.unwrap();

        assert_eq!(
            store.get("users/u1").await.unwrap(),
            Some(json!({"a": 1, "b": 3, "c": 4}))
        );
    }

    #[tokio::test]
    async fn test_push_keys_are_chronologically_sortable() {
        let store = MemoryTreeStore::new();
        let k1 = store.push("log", json!(1)).await.unwrap();
        let k2 = store.push("log", json!(2)).await.unwrap();
        let k3 = store.push("log", json!(3)).await.unwrap();
        assert!(k1 < k2 && k2 < k3, "push keys must sort in append order");

        let log = store.get("log").await.unwrap().unwrap();
        assert_eq!(log.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_transaction_counters_do_not_lose_increments() {
        let store = Arc::new(MemoryTreeStore::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .transaction(
                        "user_activity/u1/s1",
                        Box::new(|current| {
                            let count = current
                                .as_ref()
                                .and_then(|v| v.get("play_count"))
                                .and_then(|v| v.as_i64())
                                .unwrap_or(0);
                            Some(json!({"play_count": count + 1}))
                        }),
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let node = store.get("user_activity/u1/s1").await.unwrap().unwrap();
        assert_eq!(node["play_count"], json!(8));
    }

    #[tokio::test]
    async fn test_transaction_returning_none_deletes_node() {
        let store = MemoryTreeStore::new();
        store.set("a/b", json!(1)).await.unwrap();
        store
            .transaction("a/b", Box::new(|_| None))
            .await
            .unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryTreeStore::new();
        store.set("a/b/c", json!(1)).await.unwrap();
        store.remove("a/b").await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), None);
    }
}
