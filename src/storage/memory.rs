use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::feed::{ChildFeed, children_of};
use super::{ChildStream, RealtimeStore, StoreError, new_push_key, path_segments, split_path};

/// In-process JSON tree. Nothing survives the process.
#[derive(Debug)]
pub struct MemoryStore {
    root: Mutex<Value>,
    feed: ChildFeed,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Object(Map::new())),
            feed: ChildFeed::new(),
        }
    }

    fn root(&self) -> MutexGuard<'_, Value> {
        self.root.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = path_segments(path)?;
        let root = self.root();
        let mut node = &*root;
        for segment in segments {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok(Some(node.clone()))
    }

    /// Write `value` at `path`; returns whether the path was previously empty.
    fn write(&self, path: &str, value: Value) -> Result<bool, StoreError> {
        let segments = path_segments(path)?;
        let mut root = self.root();
        let mut node = &mut *root;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        for segment in parents {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            node = node
                .as_object_mut()
                .map(|map| map.entry(segment.to_string()).or_insert(Value::Null))
                .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        }
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let map = node
            .as_object_mut()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        let previous = map.insert(last.to_string(), value);
        Ok(matches!(previous, None | Some(Value::Null)))
    }
}

#[async_trait]
impl RealtimeStore for MemoryStore {
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = new_push_key();
        let parent = path_segments(path)?.join("/");
        self.write(&format!("{parent}/{key}"), value.clone())?;
        self.feed.publish(&parent, &key, value);
        Ok(key)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.read(path)?.filter(|value| !value.is_null()))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        if value.is_null() {
            return self.remove(path).await;
        }
        let created = self.write(path, value.clone())?;
        if created {
            let (parent, key) = split_path(path)?;
            self.feed.publish(&parent, &key, value);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let segments = path_segments(path)?;
        let mut root = self.root();
        let mut node = &mut *root;
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        for segment in parents {
            match node.get_mut(*segment) {
                Some(child) => node = child,
                None => return Ok(()),
            }
        }
        if let Some(map) = node.as_object_mut() {
            map.remove(*last);
        }
        Ok(())
    }

    async fn child_added(&self, path: &str) -> Result<ChildStream, StoreError> {
        let parent = path_segments(path)?.join("/");
        let receiver = self.feed.subscribe();
        let existing = children_of(self.read(&parent)?);
        Ok(ChildFeed::stream(receiver, parent, existing))
    }
}
