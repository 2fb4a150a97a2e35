//! Child-added fan-out for the in-process backends.
//!
//! One broadcast buffer of `FEED_CAPACITY` items is shared by every
//! collection of a store. A listener that falls more than that many inserts
//! behind (counting inserts into any collection) gets `StoreError::Lagged`
//! and the skipped children are not redelivered; re-subscribing replays
//! them from the store.

use std::collections::HashSet;

use futures::StreamExt;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChildEvent, ChildStream, StoreError};

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub parent: String,
    pub event: ChildEvent,
}

/// In-process fan-out of inserted children, shared by the local backends.
#[derive(Debug, Clone)]
pub struct ChildFeed {
    sender: broadcast::Sender<FeedItem>,
}

impl Default for ChildFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChildFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    /// Must be called before the existing children are snapshotted, so no
    /// insert falls between the snapshot and the live feed.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedItem> {
        self.sender.subscribe()
    }

    pub fn publish(&self, parent: &str, key: &str, value: Value) {
        // No listeners is not an error.
        let _ = self.sender.send(FeedItem {
            parent: parent.to_string(),
            event: ChildEvent {
                key: key.to_string(),
                value,
            },
        });
    }

    /// Replay `existing`, then forward live inserts under `parent`. Keys seen
    /// in the replay are not delivered twice.
    pub fn stream(
        receiver: broadcast::Receiver<FeedItem>,
        parent: String,
        existing: Vec<ChildEvent>,
    ) -> ChildStream {
        let seen: HashSet<String> = existing.iter().map(|event| event.key.clone()).collect();

        let live = futures::stream::unfold(
            (receiver, parent, seen),
            |(mut receiver, parent, mut seen)| async move {
                loop {
                    match receiver.recv().await {
                        Ok(item) => {
                            if item.parent != parent || !seen.insert(item.event.key.clone()) {
                                continue;
                            }
                            return Some((Ok(item.event), (receiver, parent, seen)));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            return Some((
                                Err(StoreError::Lagged(skipped)),
                                (receiver, parent, seen),
                            ));
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            },
        );

        futures::stream::iter(existing.into_iter().map(Ok))
            .chain(live)
            .boxed()
    }
}

/// Children of a collection value, in key order.
pub fn children_of(collection: Option<Value>) -> Vec<ChildEvent> {
    match collection {
        Some(Value::Object(map)) => map
            .into_iter()
            .map(|(key, value)| ChildEvent { key, value })
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replays_existing_then_forwards_matching_parent() {
        let feed = ChildFeed::new();
        let receiver = feed.subscribe();
        let existing = vec![ChildEvent {
            key: "a".into(),
            value: json!(1),
        }];
        let mut stream = ChildFeed::stream(receiver, "messages".into(), existing);

        feed.publish("other", "x", json!(0));
        feed.publish("messages", "a", json!(1));
        feed.publish("messages", "b", json!(2));

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first.key, "a");
        assert_eq!(second.key, "b");
    }
}
