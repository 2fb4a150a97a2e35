/// Author name used when the sender's identity is unknown.
pub const ANONYMOUS: &str = "Anonymous";

/// Session id used when the caller passes a blank one.
pub const UNKNOWN_SESSION: &str = "unknown";

/// Domain model for one chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Store key of the record; empty until the message has been persisted.
    pub key: String,
    pub text: String,
    pub author_name: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
}

impl Message {
    pub fn new(
        text: impl Into<String>,
        author_name: impl Into<String>,
        timestamp: i64,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            key: String::new(),
            text: text.into(),
            author_name: author_name.into(),
            timestamp,
            session_id: session_id.into(),
        }
    }

    /// Whether the viewer with `viewer_name` wrote this message.
    pub fn is_own(&self, viewer_name: &str) -> bool {
        self.author_name == viewer_name
    }
}

/// Normalize a caller-supplied session id.
pub fn session_or_unknown(session_id: &str) -> String {
    if session_id.trim().is_empty() {
        UNKNOWN_SESSION.to_string()
    } else {
        session_id.to_string()
    }
}
