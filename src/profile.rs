use serde_json::Value;

use crate::common::IdentityProvider;
use crate::preferences::UserRecords;
use crate::storage::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub photo_url: Option<String>,
}

/// Profile of the signed-in user, read from `users/{uid}`. When no record
/// exists yet the identity provider's details are used instead. `None` when
/// nobody is signed in.
pub async fn fetch_profile(
    identity: &dyn IdentityProvider,
    records: &UserRecords,
) -> Result<Option<UserProfile>, StoreError> {
    let Some(uid) = identity.current_user_id() else {
        return Ok(None);
    };

    let profile = match records.record(&uid).await? {
        Some(record) => {
            let field = |name: &str| {
                record
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            UserProfile {
                name: field("displayName"),
                email: field("email"),
                photo_url: Some(field("photoURL")),
                uid,
            }
        }
        None => UserProfile {
            name: identity.current_display_name(),
            email: identity.current_email().unwrap_or_default(),
            photo_url: None,
            uid,
        },
    };
    Ok(Some(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StaticIdentity;
    use crate::storage::{MemoryStore, RealtimeStore};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn stored_record_wins_over_identity() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                "users/u1",
                json!({"displayName": "Alice", "email": "a@x.io", "photoURL": "https://img/a.png"}),
            )
            .await
            .unwrap();
        let identity = StaticIdentity::signed_in("u1", "alice-auth");

        let profile = fetch_profile(&identity, &UserRecords::new(store))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.name, "Alice");
        assert_eq!(profile.photo_url.as_deref(), Some("https://img/a.png"));
    }

    #[tokio::test]
    async fn missing_record_uses_identity_and_signed_out_is_none() {
        let store = Arc::new(MemoryStore::new());
        let records = UserRecords::new(store);

        let identity = StaticIdentity::signed_in("u2", "Bob");
        let profile = fetch_profile(&identity, &records).await.unwrap().unwrap();
        assert_eq!(profile.name, "Bob");
        assert_eq!(profile.photo_url, None);

        let nobody = StaticIdentity::anonymous();
        assert_eq!(fetch_profile(&nobody, &records).await.unwrap(), None);
    }
}
