use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::storage::{RealtimeStore, StoreError};

pub const USERS_PATH: &str = "users";

/// Per-user key/value record.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// String stored under `key`; values of any other type read as absent.
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError>;
}

/// User records kept in the realtime database under `users/{uid}`.
#[derive(Clone)]
pub struct UserRecords {
    store: Arc<dyn RealtimeStore>,
}

impl UserRecords {
    pub fn new(store: Arc<dyn RealtimeStore>) -> Self {
        Self { store }
    }

    fn path(user_id: &str, key: &str) -> String {
        format!("{USERS_PATH}/{user_id}/{key}")
    }

    /// The whole record of `user_id`.
    pub async fn record(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(&format!("{USERS_PATH}/{user_id}")).await
    }

    pub async fn set_value(&self, user_id: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.store.set(&Self::path(user_id, key), value).await
    }
}

#[async_trait]
impl PreferenceStore for UserRecords {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.store.get(&Self::path(user_id, key)).await?;
        Ok(value.and_then(|value| value.as_str().map(str::to_string)))
    }

    async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), StoreError> {
        self.set_value(user_id, key, Value::String(value.to_string()))
            .await
    }
}
