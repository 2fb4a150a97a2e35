use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_RETENTION_MS;
use crate::common::StaticIdentity;
use crate::storage::{FirebaseStore, MemoryStore, RealtimeStore, SqliteStore, StoreError};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";
pub const DEFAULT_SQLITE_PATH: &str = "data/chat.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    #[default]
    Sqlite,
    Firebase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Root URL of the realtime database, e.g. `https://<project>.firebaseio.com`.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
    #[serde(default = "default_retention_ms")]
    pub retention_ms: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

fn default_sqlite_path() -> String {
    DEFAULT_SQLITE_PATH.to_string()
}

fn default_retention_ms() -> i64 {
    DEFAULT_RETENTION_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database_url: None,
            auth_token: None,
            sqlite_path: default_sqlite_path(),
            retention_ms: default_retention_ms(),
            user_id: None,
            display_name: None,
            email: None,
        }
    }
}

impl AppConfig {
    /// Overlay `CHAT_*` environment variables on top of the file values.
    pub fn apply_env(mut self) -> Self {
        self.apply_overrides(|name| env::var(name).ok());
        self
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(url) = lookup("CHAT_DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(token) = lookup("CHAT_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
        if let Some(user_id) = lookup("CHAT_USER_ID") {
            self.user_id = Some(user_id);
        }
        if let Some(name) = lookup("CHAT_DISPLAY_NAME") {
            self.display_name = Some(name);
        }
    }

    pub fn identity(&self) -> StaticIdentity {
        StaticIdentity {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            email: self.email.clone(),
        }
    }

    pub fn open_store(&self) -> Result<Arc<dyn RealtimeStore>, StoreError> {
        let store: Arc<dyn RealtimeStore> = match self.backend {
            Backend::Memory => Arc::new(MemoryStore::new()),
            Backend::Sqlite => Arc::new(SqliteStore::with_path(&self.sqlite_path)?),
            Backend::Firebase => {
                let url = self.database_url.clone().ok_or_else(|| {
                    StoreError::Misconfigured("database_url is required for the firebase backend".into())
                })?;
                Arc::new(FirebaseStore::new(url, self.auth_token.clone()))
            }
        };
        Ok(store)
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"backend": "firebase", "user_id": "u1"}"#).unwrap();
        assert_eq!(config.backend, Backend::Firebase);
        assert_eq!(config.retention_ms, DEFAULT_RETENTION_MS);
        assert_eq!(config.sqlite_path, DEFAULT_SQLITE_PATH);
        assert_eq!(config.identity().user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = load_config("does/not/exist.json");
        assert_eq!(config.backend, Backend::Sqlite);
    }

    #[test]
    fn non_blank_overrides_win() {
        let mut config = AppConfig::default();
        config.display_name = Some("file".into());
        config.apply_overrides(|name| match name {
            "CHAT_DATABASE_URL" => Some("https://demo.firebaseio.com".into()),
            "CHAT_DISPLAY_NAME" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.database_url.as_deref(), Some("https://demo.firebaseio.com"));
        assert_eq!(config.display_name.as_deref(), Some("file"));
    }

    #[test]
    fn firebase_backend_needs_a_url() {
        let config = AppConfig {
            backend: Backend::Firebase,
            ..AppConfig::default()
        };
        assert!(config.open_store().is_err());
    }
}
