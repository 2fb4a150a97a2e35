//! App-wide appearance, mirrored to `users/{uid}/theme_android` so other
//! devices pick it up.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::common::IdentityProvider;
use crate::preferences::UserRecords;
use crate::theme::Color;

pub const APPEARANCE_KEY: &str = "theme_android";
pub const MAX_RADIUS_DP: f32 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Appearance {
    pub background_color: Color,
    pub button_color: Color,
    pub container_color: Color,
    /// 0.0..=1.0
    pub container_opacity: f32,
    /// 0.0..=64.0 dp
    pub container_radius_dp: f32,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            background_color: Color(0xFFFF_FFFF),
            button_color: Color(0xFF2B_7E76),
            container_color: Color(0xFFEA_E7F2),
            container_opacity: 0.10,
            container_radius_dp: 12.0,
        }
    }
}

/// Remote record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppearancePayload {
    pub background_color: String,
    pub button_color: String,
    pub container_color: String,
    pub container_opacity: f32,
    pub container_radius: f32,
}

impl From<&Appearance> for AppearancePayload {
    fn from(appearance: &Appearance) -> Self {
        Self {
            background_color: appearance.background_color.to_hex_rgb(),
            button_color: appearance.button_color.to_hex_rgb(),
            container_color: appearance.container_color.to_hex_rgb(),
            container_opacity: appearance.container_opacity,
            container_radius: appearance.container_radius_dp,
        }
    }
}

/// Holds the current appearance and writes every change through to the
/// signed-in user's record. Sync failures are logged and dropped.
pub struct AppearanceSettings {
    current: Appearance,
    records: UserRecords,
    identity: Arc<dyn IdentityProvider>,
}

impl AppearanceSettings {
    pub fn new(current: Appearance, records: UserRecords, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            current,
            records,
            identity,
        }
    }

    pub fn current(&self) -> &Appearance {
        &self.current
    }

    pub async fn set_background_color(&mut self, color: Color) {
        self.current.background_color = color;
        self.sync().await;
    }

    pub async fn set_button_color(&mut self, color: Color) {
        self.current.button_color = color;
        self.sync().await;
    }

    pub async fn set_container_color(&mut self, color: Color) {
        self.current.container_color = color;
        self.sync().await;
    }

    pub async fn set_container_opacity(&mut self, opacity: f32) {
        self.current.container_opacity = opacity.clamp(0.0, 1.0);
        self.sync().await;
    }

    pub async fn set_container_radius(&mut self, radius_dp: f32) {
        self.current.container_radius_dp = radius_dp.clamp(0.0, MAX_RADIUS_DP);
        self.sync().await;
    }

    /// Returns whether the remote record was written.
    pub async fn sync(&self) -> bool {
        let Some(user_id) = self.identity.current_user_id() else {
            return false;
        };
        let payload = match serde_json::to_value(AppearancePayload::from(&self.current)) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("Failed to encode appearance: {err}");
                return false;
            }
        };
        match self.records.set_value(&user_id, APPEARANCE_KEY, payload).await {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Failed to sync appearance for {user_id}: {err}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StaticIdentity;
    use crate::storage::{MemoryStore, RealtimeStore};
    use serde_json::json;

    #[tokio::test]
    async fn setters_clamp_and_write_the_whole_payload() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = AppearanceSettings::new(
            Appearance::default(),
            UserRecords::new(store.clone()),
            Arc::new(StaticIdentity::signed_in("u1", "alice")),
        );

        settings.set_container_opacity(1.5).await;
        settings.set_container_radius(-3.0).await;
        settings.set_button_color(Color(0xFF11_2233)).await;

        let stored = store.get("users/u1/theme_android").await.unwrap().unwrap();
        assert_eq!(
            stored,
            json!({
                "backgroundColor": "#FFFFFF",
                "buttonColor": "#112233",
                "containerColor": "#EAE7F2",
                "containerOpacity": 1.0,
                "containerRadius": 0.0
            })
        );
    }

    #[tokio::test]
    async fn signed_out_changes_stay_local() {
        let store = Arc::new(MemoryStore::new());
        let mut settings = AppearanceSettings::new(
            Appearance::default(),
            UserRecords::new(store.clone()),
            Arc::new(StaticIdentity::anonymous()),
        );
        settings.set_container_radius(100.0).await;

        assert_eq!(settings.current().container_radius_dp, MAX_RADIUS_DP);
        assert!(!settings.sync().await);
    }
}
