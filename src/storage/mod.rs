//! Realtime database backends.
//!
//! Every backend exposes the same narrow surface: JSON values addressed by
//! slash-separated paths, plus a "child added" stream per collection.

pub mod error;
pub mod feed;
pub mod firebase;
pub mod memory;
pub mod sqlite;

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;
use uuid::Uuid;

pub use error::StoreError;
pub use firebase::FirebaseStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One child of a collection, as delivered by a `child_added` stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildEvent {
    pub key: String,
    pub value: Value,
}

pub type ChildStream = BoxStream<'static, Result<ChildEvent, StoreError>>;

#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Insert `value` as a new child of `path` and return its generated key.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Value at `path`; a collection comes back as an object of its children.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    async fn remove(&self, path: &str) -> Result<(), StoreError>;

    /// Replays every existing child of `path`, then yields each new child
    /// once. Changes to or removals of children are not reported.
    async fn child_added(&self, path: &str) -> Result<ChildStream, StoreError>;
}

/// New unique key for `push`. UUID v7 keys sort in creation order.
pub fn new_push_key() -> String {
    Uuid::now_v7().simple().to_string()
}

/// Validate `path` and return its segments.
pub fn path_segments(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(segments)
}

/// Split `path` into its parent collection and final key.
pub fn split_path(path: &str) -> Result<(String, String), StoreError> {
    let mut segments = path_segments(path)?;
    let key = segments.pop().unwrap_or_default().to_string();
    Ok((segments.join("/"), key))
}

/// Ensure data directory exists
pub fn ensure_data_dir<P: AsRef<Path>>(db_path: P) -> std::io::Result<()> {
    if let Some(parent) = db_path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_path_separates_parent_and_key() {
        assert_eq!(
            split_path("/users/u1/chatTheme").unwrap(),
            ("users/u1".to_string(), "chatTheme".to_string())
        );
        assert_eq!(
            split_path("messages").unwrap(),
            (String::new(), "messages".to_string())
        );
    }

    #[test]
    fn empty_segments_are_rejected() {
        assert!(path_segments("").is_err());
        assert!(path_segments("users//x").is_err());
    }

    #[test]
    fn push_keys_sort_in_creation_order() {
        let first = new_push_key();
        let second = new_push_key();
        assert!(first < second);
    }
}
