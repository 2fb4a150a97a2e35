use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Result as SqlResult, params};
use serde_json::{Map, Value};

use super::feed::ChildFeed;
use super::{
    ChildEvent, ChildStream, RealtimeStore, StoreError, ensure_data_dir, new_push_key,
    path_segments, split_path,
};

/// Single-file local store. Each value lives in one row keyed by its parent
/// collection and its own key; `get` on a collection returns its direct
/// children.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    feed: ChildFeed,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Err(err) = ensure_data_dir(&path) {
            log::warn!(
                "Unable to create directory for {}: {err}",
                path.as_ref().display()
            );
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            feed: ChildFeed::new(),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, collection: &str, key: &str) -> Result<Option<Value>, StoreError> {
        let raw: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM records WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    fn children(&self, collection: &str) -> Result<Vec<ChildEvent>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT key, value FROM records
             WHERE collection = ?1
             ORDER BY key ASC",
        )?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<SqlResult<Vec<_>>>()?;

        let mut children = Vec::with_capacity(rows.len());
        for (key, raw) in rows {
            match serde_json::from_str(&raw) {
                Ok(value) => children.push(ChildEvent { key, value }),
                Err(err) => log::warn!("Skipping unreadable record {collection}/{key}: {err}"),
            }
        }
        Ok(children)
    }

    /// Insert or replace; returns whether the row is new.
    fn upsert(&self, collection: &str, key: &str, value: &Value) -> Result<bool, StoreError> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn();
        let existed: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM records WHERE collection = ?1 AND key = ?2)",
            params![collection, key],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO records (collection, key, value) VALUES (?1, ?2, ?3)",
            params![collection, key, raw],
        )?;
        Ok(!existed)
    }
}

fn init_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (collection, key)
        )",
        [],
    )?;
    Ok(())
}

#[async_trait]
impl RealtimeStore for SqliteStore {
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let collection = path_segments(path)?.join("/");
        let key = new_push_key();
        self.upsert(&collection, &key, &value)?;
        self.feed.publish(&collection, &key, value);
        Ok(key)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let (collection, key) = split_path(path)?;
        if let Some(value) = self.record(&collection, &key)? {
            return Ok(Some(value));
        }

        let full = path_segments(path)?.join("/");
        let children = self.children(&full)?;
        if children.is_empty() {
            return Ok(None);
        }
        let map: Map<String, Value> = children
            .into_iter()
            .map(|child| (child.key, child.value))
            .collect();
        Ok(Some(Value::Object(map)))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        if value.is_null() {
            return self.remove(path).await;
        }
        let (collection, key) = split_path(path)?;
        if self.upsert(&collection, &key, &value)? {
            self.feed.publish(&collection, &key, value);
        }
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), StoreError> {
        let (collection, key) = split_path(path)?;
        let full = path_segments(path)?.join("/");
        let conn = self.conn();
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND key = ?2",
            params![collection, key],
        )?;
        conn.execute(
            "DELETE FROM records
             WHERE collection = ?1 OR substr(collection, 1, length(?1) + 1) = ?1 || '/'",
            params![full],
        )?;
        Ok(())
    }

    async fn child_added(&self, path: &str) -> Result<ChildStream, StoreError> {
        let collection = path_segments(path)?.join("/");
        let receiver = self.feed.subscribe();
        let existing = self.children(&collection)?;
        Ok(ChildFeed::stream(receiver, collection, existing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn collection_get_returns_children_in_key_order() {
        let store = SqliteStore::in_memory().unwrap();
        let a = store.push("messages", json!({"text": "a"})).await.unwrap();
        let b = store.push("messages", json!({"text": "b"})).await.unwrap();

        let all = store.get("messages").await.unwrap().unwrap();
        let keys: Vec<&String> = all.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec![&a, &b]);
        assert_eq!(
            store.get(&format!("messages/{b}")).await.unwrap(),
            Some(json!({"text": "b"}))
        );
    }

    #[tokio::test]
    async fn remove_deletes_record_and_descendants() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("users/u1/chatTheme", json!("Red")).await.unwrap();
        store.set("users/u1/email", json!("a@b.c")).await.unwrap();

        store.remove("users/u1").await.unwrap();
        assert_eq!(store.get("users/u1").await.unwrap(), None);
        assert_eq!(store.get("users/u1/chatTheme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn remove_leaves_similarly_named_siblings() {
        let store = SqliteStore::in_memory().unwrap();
        store.set("users/a_b/x", json!(1)).await.unwrap();
        store.set("users/aXb/x", json!(2)).await.unwrap();
        store.set("users/a_bc/x", json!(3)).await.unwrap();

        store.remove("users/a_b").await.unwrap();
        assert_eq!(store.get("users/a_b/x").await.unwrap(), None);
        assert_eq!(store.get("users/aXb/x").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get("users/a_bc/x").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn child_added_sees_new_rows_once() {
        let store = SqliteStore::in_memory().unwrap();
        let mut stream = store.child_added("messages").await.unwrap();

        let key = store.push("messages", json!({"text": "x"})).await.unwrap();
        store
            .set(&format!("messages/{key}"), json!({"text": "edited"}))
            .await
            .unwrap();
        let other = store.push("messages", json!({"text": "y"})).await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap().key, key);
        assert_eq!(stream.next().await.unwrap().unwrap().key, other);
    }
}
