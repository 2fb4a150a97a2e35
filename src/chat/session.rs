use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use crate::common::{ChatEvent, IdentityProvider, Message, session_or_unknown};
use crate::storage::StoreError;
use crate::theme::{self, ChatTheme, ThemePreferences};

use super::client::{MessageStoreClient, SubscriptionHandle};
use super::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Closed,
    Initializing,
    Active,
}

/// State shared with the live listener.
#[derive(Default)]
struct SessionView {
    /// Cleared on close so late listener callbacks are dropped.
    active: bool,
    messages: Vec<Message>,
    seen: HashSet<String>,
}

impl SessionView {
    fn accept(&mut self, message: &Message) -> bool {
        if !self.active {
            return false;
        }
        if !message.key.is_empty() && !self.seen.insert(message.key.clone()) {
            return false;
        }
        self.messages.push(message.clone());
        true
    }
}

/// One open chat overlay: its history, its live listener and the viewer's
/// theme. Store failures never escape `open`; the overlay just shows less.
pub struct ChatSession {
    client: Arc<MessageStoreClient>,
    identity: Arc<dyn IdentityProvider>,
    themes: Option<ThemePreferences>,
    events: mpsc::UnboundedSender<ChatEvent>,
    view: Arc<Mutex<SessionView>>,
    session_id: String,
    phase: Phase,
    handle: Option<SubscriptionHandle>,
    theme: &'static ChatTheme,
}

impl ChatSession {
    pub fn new(
        client: Arc<MessageStoreClient>,
        identity: Arc<dyn IdentityProvider>,
        themes: Option<ThemePreferences>,
    ) -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Self {
            client,
            identity,
            themes,
            events,
            view: Arc::new(Mutex::new(SessionView::default())),
            session_id: String::new(),
            phase: Phase::Closed,
            handle: None,
            theme: theme::default_theme(),
        };
        (session, receiver)
    }

    fn view(&self) -> MutexGuard<'_, SessionView> {
        self.view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn current_theme(&self) -> &'static ChatTheme {
        self.theme
    }

    /// Snapshot of the messages shown so far, history first.
    pub fn messages(&self) -> Vec<Message> {
        self.view().messages.clone()
    }

    /// Start showing `session_id`: sweep stale messages in the background,
    /// load history, then follow new messages. The theme loads alongside.
    pub async fn open(&mut self, session_id: &str) {
        if self.phase != Phase::Closed {
            log::warn!("Chat session {} is already open", self.session_id);
            return;
        }
        self.session_id = session_or_unknown(session_id);
        self.phase = Phase::Initializing;
        {
            let mut view = self.view();
            view.active = true;
            view.messages.clear();
            view.seen.clear();
        }
        log::info!("Opening chat session {}", self.session_id);

        let (theme, handle) = tokio::join!(self.load_theme(), self.start_messages());
        self.theme = theme;
        self.handle = handle;
        self.phase = Phase::Active;
    }

    async fn load_theme(&self) -> &'static ChatTheme {
        let theme = match &self.themes {
            Some(themes) => themes.load_user_theme().await,
            None => theme::default_theme(),
        };
        if self.view().active {
            let _ = self.events.send(ChatEvent::ThemeLoaded(theme));
        }
        theme
    }

    async fn start_messages(&self) -> Option<SubscriptionHandle> {
        // Not awaited: history may still include records this sweep deletes.
        let client = Arc::clone(&self.client);
        tokio::spawn(async move {
            match client.cleanup().await {
                Ok(deleted) => log::debug!("Retention sweep removed {deleted} messages"),
                Err(err) => log::warn!("Retention sweep failed: {err}"),
            }
        });

        let history = match self.client.fetch_all(&self.session_id).await {
            Ok(history) => history,
            Err(err) => {
                log::error!("Error loading chat history for {}: {err}", self.session_id);
                Vec::new()
            }
        };
        self.apply_history(history);

        let view = Arc::clone(&self.view);
        let events = self.events.clone();
        let subscribed = self
            .client
            .subscribe(&self.session_id, move |message| {
                let accepted = view
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .accept(&message);
                if accepted {
                    let _ = events.send(ChatEvent::MessageReceived(message));
                }
            })
            .await;

        match subscribed {
            Ok(handle) => Some(handle),
            Err(err) => {
                log::error!("Error subscribing to chat {}: {err}", self.session_id);
                None
            }
        }
    }

    fn apply_history(&self, history: Vec<Message>) {
        let mut view = self.view();
        if !view.active {
            return;
        }
        view.seen = history.iter().map(|message| message.key.clone()).collect();
        view.messages = history.clone();
        drop(view);
        let _ = self.events.send(ChatEvent::HistoryLoaded(history));
    }

    /// Send `text` as the current viewer. Blank text is discarded and gives
    /// `Ok(None)`; otherwise the new record's key. The message itself shows
    /// up through the live listener.
    pub async fn send(&self, text: &str) -> Result<Option<String>, StoreError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        if self.phase == Phase::Closed {
            log::warn!("Dropping message sent while the chat is closed");
            return Ok(None);
        }
        let message = Message::new(
            text,
            self.identity.author_name(),
            timestamp::now_millis(),
            self.session_id.clone(),
        );
        match self.client.send(&message).await {
            Ok(key) => Ok(Some(key)),
            Err(err) => {
                log::warn!("Error sending message to {}: {err}", self.session_id);
                Err(err)
            }
        }
    }

    /// Remember `name` for the viewer, then switch this session to it. A
    /// failed write leaves the current theme in place.
    pub async fn save_theme(&mut self, name: &str) -> Result<&'static ChatTheme, StoreError> {
        if let Some(themes) = &self.themes {
            themes.save_user_theme(name).await?;
        }
        self.theme = theme::resolve(Some(name));
        Ok(self.theme)
    }

    /// Stop listening. Safe to call more than once.
    pub fn close(&mut self) {
        self.view().active = false;
        if let Some(handle) = self.handle.take() {
            self.client.unsubscribe(handle);
        }
        if self.phase != Phase::Closed {
            log::info!("Closed chat session {}", self.session_id);
        }
        self.phase = Phase::Closed;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.close();
    }
}
