use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::common::Message;
use crate::storage::feed::children_of;
use crate::storage::{RealtimeStore, StoreError};

use super::timestamp;

pub const MESSAGES_PATH: &str = "messages";
pub const DEFAULT_RETENTION_MS: i64 = 3_600_000;

/// Called once a detached send finishes, with `true` on success.
pub type CompletionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Token for one live listener registered through
/// [`MessageStoreClient::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

/// Body of one record in the `messages` collection.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireMessage<'a> {
    text: &'a str,
    user_name: &'a str,
    time_stamp: String,
    game_id: &'a str,
}

/// All reads and writes against the shared `messages` collection.
///
/// The collection is flat: every session's messages live side by side and
/// are told apart by their `gameId` on the client. `fetch_all` and `cleanup`
/// therefore read the whole collection, which is fine at chat-room scale
/// but grows linearly with traffic.
pub struct MessageStoreClient {
    store: Arc<dyn RealtimeStore>,
    retention_ms: i64,
    listeners: Mutex<HashMap<u64, JoinHandle<()>>>,
    next_listener: AtomicU64,
}

impl MessageStoreClient {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self::with_retention(store, DEFAULT_RETENTION_MS)
    }

    pub fn with_retention(store: Arc<dyn RealtimeStore>, retention_ms: i64) -> Self {
        Self {
            store,
            retention_ms,
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `message` under a fresh key and return that key.
    pub async fn send(&self, message: &Message) -> Result<String, StoreError> {
        let record = WireMessage {
            text: &message.text,
            user_name: &message.author_name,
            time_stamp: timestamp::encode(message.timestamp),
            game_id: &message.session_id,
        };
        let key = self
            .store
            .push(MESSAGES_PATH, serde_json::to_value(&record)?)
            .await?;
        log::debug!("Sent message {key} to session {}", message.session_id);
        Ok(key)
    }

    /// Fire-and-forget form of [`send`](Self::send).
    pub fn send_detached(
        self: &Arc<Self>,
        message: Message,
        on_complete: Option<CompletionCallback>,
    ) {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let sent = match client.send(&message).await {
                Ok(_) => true,
                Err(err) => {
                    log::warn!("Failed to send message: {err}");
                    false
                }
            };
            if let Some(on_complete) = on_complete {
                on_complete(sent);
            }
        });
    }

    /// Every message of `session_id`, oldest first. Messages sharing a
    /// timestamp keep the store's key order.
    pub async fn fetch_all(&self, session_id: &str) -> Result<Vec<Message>, StoreError> {
        let collection = self.store.get(MESSAGES_PATH).await?;
        let mut messages: Vec<Message> = children_of(collection)
            .into_iter()
            .filter_map(|child| decode_record(&child.key, &child.value))
            .filter(|message| message.session_id == session_id)
            .collect();
        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }

    /// Call `on_message` for every message of `session_id` already stored
    /// and for each one added later, until [`unsubscribe`](Self::unsubscribe).
    /// Listener errors are logged and otherwise ignored.
    pub async fn subscribe<F>(
        &self,
        session_id: &str,
        mut on_message: F,
    ) -> Result<SubscriptionHandle, StoreError>
    where
        F: FnMut(Message) + Send + 'static,
    {
        let mut children = self.store.child_added(MESSAGES_PATH).await?;
        let session_id = session_id.to_string();

        let task = tokio::spawn(async move {
            while let Some(child) = children.next().await {
                match child {
                    Ok(child) => match decode_record(&child.key, &child.value) {
                        Some(message) if message.session_id == session_id => on_message(message),
                        Some(_) => {}
                        None => log::debug!("Skipping malformed message record {}", child.key),
                    },
                    Err(err) => log::warn!("Message listener error: {err}"),
                }
            }
            log::debug!("Message listener for {session_id} ended");
        });

        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners().insert(id, task);
        Ok(SubscriptionHandle(id))
    }

    /// Stop the listener behind `handle`. Releasing a handle twice is a no-op.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        match self.listeners().remove(&handle.0) {
            Some(task) => task.abort(),
            None => log::debug!("Listener {} already released", handle.0),
        }
    }

    pub fn active_listeners(&self) -> usize {
        self.listeners().len()
    }

    /// Delete every message, of any session, older than the retention
    /// window. Returns how many records were deleted.
    pub async fn cleanup(&self) -> Result<usize, StoreError> {
        self.cleanup_older_than(self.retention_ms, timestamp::now_millis())
            .await
    }

    pub async fn cleanup_older_than(&self, max_age_ms: i64, now: i64) -> Result<usize, StoreError> {
        let collection = self.store.get(MESSAGES_PATH).await?;
        let stale: Vec<String> = children_of(collection)
            .into_iter()
            .filter(|child| child.value.is_object())
            .filter(|child| {
                let sent_at = timestamp::decode(child.value.get("timeStamp").unwrap_or(&Value::Null));
                now.saturating_sub(sent_at) > max_age_ms
            })
            .map(|child| child.key)
            .collect();

        let removals = stale.iter().map(|key| async move {
            let path = format!("{MESSAGES_PATH}/{key}");
            match self.store.remove(&path).await {
                Ok(()) => true,
                Err(err) => {
                    log::warn!("Failed to delete stale message {key}: {err}");
                    false
                }
            }
        });
        let deleted = futures::future::join_all(removals)
            .await
            .into_iter()
            .filter(|removed| *removed)
            .count();

        if deleted > 0 {
            log::info!("Removed {deleted} messages older than {max_age_ms} ms");
        }
        Ok(deleted)
    }
}

impl Drop for MessageStoreClient {
    fn drop(&mut self) {
        for (_, task) in self.listeners().drain() {
            task.abort();
        }
    }
}

/// Decode one stored record. Anything but a JSON object is malformed;
/// missing or mistyped fields fall back to empty strings and a zero
/// timestamp.
pub fn decode_record(key: &str, value: &Value) -> Option<Message> {
    let fields = value.as_object()?;
    let text_field = |name: &str| {
        fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Some(Message {
        key: key.to_string(),
        text: text_field("text"),
        author_name: text_field("userName"),
        timestamp: timestamp::decode(fields.get("timeStamp").unwrap_or(&Value::Null)),
        session_id: text_field("gameId"),
    })
}
