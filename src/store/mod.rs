//! Key-value tree storage seam.
//!
//! Durable state lives in a remote key-value tree reached through the
//! [`TreeStore`] trait; this crate only ships the in-memory
//! implementation used for local runs and tests. Paths are
//! slash-separated; keys with characters the tree forbids go through
//! [`safe_key`] first.

mod memory;

pub use memory::MemoryTreeStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("store path \"{path}\" rejected: {detail}")]
    InvalidPath { path: String, detail: String },

    #[error("store operation failed: {0}")]
    Backend(String),
}

/// Mutation applied inside [`TreeStore::transaction`]. Receives the
/// current value of the node (or `None`) and returns the replacement
/// (`None` deletes the node).
pub type TxnUpdate = Box<dyn FnMut(Option<Value>) -> Option<Value> + Send>;

#[async_trait]
pub trait TreeStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Merge the given fields into the object at `path`, creating it if
    /// absent.
    async fn update(
        &self,
        path: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Append a value under a generated, chronologically sortable key.
    /// Returns the key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Atomically rewrite the node at `path`. Concurrent transactions on
    /// the same node serialize; counters derived this way never lose
    /// increments.
    async fn transaction(&self, path: &str, update: TxnUpdate) -> Result<(), StoreError>;
}

/// Percent-escape a string for use as a tree key. `.` is escaped too,
/// on top of everything outside the unreserved set.
pub fn safe_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for b in raw.bytes() {
        let c = b as char;
        if c.is_ascii_alphanumeric()
            || matches!(c, '-' | '_' | '!' | '~' | '*' | '\'' | '(' | ')')
        {
            out.push(c);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_key_passes_unreserved_chars() {
        assert_eq!(safe_key("imagine-dragons_1"), "imagine-dragons_1");
    }

    #[test]
    fn test_safe_key_escapes_dot_and_spaces() {
        assert_eq!(safe_key("feat. artist"), "feat%2E%20artist");
        assert_eq!(safe_key("a/b#c$d"), "a%2Fb%23c%24d");
    }

    #[test]
    fn test_safe_key_is_stable() {
        assert_eq!(safe_key("tum hi ho"), safe_key("tum hi ho"));
    }
}
