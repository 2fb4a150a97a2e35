use crate::theme::ChatTheme;

use super::types::Message;

/// Events a chat session pushes up to the UI surface.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    ThemeLoaded(&'static ChatTheme),
    /// Full, timestamp-ordered history fetched on open.
    HistoryLoaded(Vec<Message>),
    MessageReceived(Message),
}
