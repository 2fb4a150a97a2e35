use super::types::ANONYMOUS;

/// Who is using the client. Authentication itself lives elsewhere; the chat
/// core only reads the result.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;

    /// Display name of the viewer, or an empty string when unknown.
    fn current_display_name(&self) -> String;

    fn current_email(&self) -> Option<String> {
        None
    }

    /// Name stamped on outgoing messages: display name, then email, then
    /// "Anonymous".
    fn author_name(&self) -> String {
        let name = self.current_display_name();
        if !name.trim().is_empty() {
            return name;
        }
        self.current_email()
            .filter(|email| !email.trim().is_empty())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }
}

/// Identity fixed at startup, e.g. from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            display_name: Some(display_name.into()),
            email: None,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn current_display_name(&self) -> String {
        self.display_name.clone().unwrap_or_default()
    }

    fn current_email(&self) -> Option<String> {
        self.email.clone()
    }
}
