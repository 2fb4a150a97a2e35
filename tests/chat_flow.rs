//! End-to-end chat flows against the local backends.

use std::sync::Arc;
use std::time::Duration;

use game_chat::chat::timestamp;
use game_chat::chat::{ChatSession, MessageStoreClient, Phase};
use game_chat::common::{ChatEvent, IdentityProvider, Message, StaticIdentity};
use game_chat::preferences::UserRecords;
use game_chat::storage::{MemoryStore, RealtimeStore, SqliteStore};
use game_chat::theme::ThemePreferences;
use tokio::sync::mpsc;

async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed")
}

mod store_client {
    use super::*;

    #[tokio::test]
    async fn sent_message_reaches_a_later_subscriber() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
        let client = MessageStoreClient::new(store);

        assert!(client.fetch_all("game42").await.unwrap().is_empty());

        let before = timestamp::now_millis();
        client
            .send(&Message::new("hi", "alice", before, "game42"))
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = client
            .subscribe("game42", move |message| {
                let _ = tx.send(message);
            })
            .await
            .unwrap();

        let message = recv_within(&mut rx).await;
        assert_eq!(message.text, "hi");
        assert_eq!(message.author_name, "alice");
        assert_eq!(message.session_id, "game42");
        assert!((message.timestamp - timestamp::now_millis()).abs() < 5_000);

        client.unsubscribe(handle);
        client.unsubscribe(handle);
    }

    #[tokio::test]
    async fn sessions_share_one_collection_but_not_messages() {
        let store: Arc<dyn RealtimeStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let client = MessageStoreClient::new(store.clone());

        for (text, ts, session) in [("a2", 20, "A"), ("b1", 10, "B"), ("a1", 10, "A")] {
            client.send(&Message::new(text, "u", ts, session)).await.unwrap();
        }

        let a: Vec<String> = client
            .fetch_all("A")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(a, vec!["a1", "a2"]);

        let all = store.get("messages").await.unwrap().unwrap();
        assert_eq!(all.as_object().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn retention_sweep_spans_every_session() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
        let client = MessageStoreClient::new(store);
        let now = timestamp::now_millis();
        let minute = 60_000;

        client.send(&Message::new("fresh", "u", now - 30 * minute, "A")).await.unwrap();
        client.send(&Message::new("stale", "u", now - 61 * minute, "B")).await.unwrap();
        client.send(&Message::new("ancient", "u", now - 120 * minute, "A")).await.unwrap();

        assert_eq!(client.cleanup().await.unwrap(), 2);
        assert_eq!(client.fetch_all("A").await.unwrap().len(), 1);
        assert!(client.fetch_all("B").await.unwrap().is_empty());
    }
}

mod session {
    use super::*;

    fn open_parts(
        store: Arc<dyn RealtimeStore>,
        identity: StaticIdentity,
    ) -> (ChatSession, mpsc::UnboundedReceiver<ChatEvent>) {
        let identity: Arc<dyn IdentityProvider> = Arc::new(identity);
        let themes = ThemePreferences::new(Arc::new(UserRecords::new(store.clone())), identity.clone());
        ChatSession::new(Arc::new(MessageStoreClient::new(store)), identity, Some(themes))
    }

    #[tokio::test]
    async fn two_viewers_see_each_others_messages() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
        let (mut alice, _alice_events) =
            open_parts(store.clone(), StaticIdentity::signed_in("u1", "alice"));
        let (mut bob, mut bob_events) = open_parts(store, StaticIdentity::anonymous());

        alice.open("game42").await;
        bob.open("game42").await;
        assert_eq!(bob.phase(), Phase::Active);

        alice.send("hi").await.unwrap();
        let received = loop {
            if let ChatEvent::MessageReceived(message) = recv_within(&mut bob_events).await {
                break message;
            }
        };
        assert_eq!(received.author_name, "alice");
        assert!(!received.is_own("Anonymous"));

        bob.send("hey").await.unwrap();
        let from_bob = loop {
            if let ChatEvent::MessageReceived(message) = recv_within(&mut bob_events).await {
                break message;
            }
        };
        assert_eq!(from_bob.author_name, "Anonymous");
        assert!(from_bob.is_own("Anonymous"));
    }

    #[tokio::test]
    async fn unknown_stored_theme_falls_back_to_default() {
        let store: Arc<dyn RealtimeStore> = Arc::new(MemoryStore::new());
        store
            .set("users/u1/chatTheme", serde_json::json!("Neon"))
            .await
            .unwrap();
        let (mut chat, mut events) = open_parts(store, StaticIdentity::signed_in("u1", "alice"));

        chat.open("game42").await;
        assert_eq!(chat.current_theme().name, "Light");

        let mut saw_theme = false;
        while let Ok(event) = events.try_recv() {
            if let ChatEvent::ThemeLoaded(theme) = event {
                assert_eq!(theme.name, "Light");
                saw_theme = true;
            }
        }
        assert!(saw_theme);
    }

    #[tokio::test]
    async fn history_arrives_sorted_on_open() {
        let store: Arc<dyn RealtimeStore> = Arc::new(SqliteStore::in_memory().unwrap());
        let client = MessageStoreClient::new(store.clone());
        let now = timestamp::now_millis();
        client.send(&Message::new("second", "u", now - 1_000, "g")).await.unwrap();
        client.send(&Message::new("first", "u", now - 2_000, "g")).await.unwrap();

        let (mut chat, mut events) = open_parts(store, StaticIdentity::anonymous());
        chat.open("g").await;

        let history = loop {
            if let ChatEvent::HistoryLoaded(history) = recv_within(&mut events).await {
                break history;
            }
        };
        let texts: Vec<&str> = history.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(chat.messages().len(), 2);
    }
}
