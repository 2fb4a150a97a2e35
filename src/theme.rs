use std::fmt;
use std::sync::Arc;

use crate::common::IdentityProvider;
use crate::preferences::PreferenceStore;
use crate::storage::StoreError;

/// Key of the theme name inside a user's record.
pub const THEME_KEY: &str = "chatTheme";

/// 32-bit ARGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u32);

impl Color {
    pub const WHITE: Color = Color(0xFFFF_FFFF);
    pub const BLACK: Color = Color(0xFF00_0000);

    /// `#RRGGBB`, alpha dropped.
    pub fn to_hex_rgb(self) -> String {
        format!("#{:06X}", self.0 & 0x00FF_FFFF)
    }

    /// Parse `#RRGGBB` (opaque) or `#AARRGGBB`.
    pub fn from_hex(hex: &str) -> Option<Color> {
        let digits = hex.strip_prefix('#').unwrap_or(hex);
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        match digits.len() {
            6 => Some(Color(0xFF00_0000 | value)),
            8 => Some(Color(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

/// Colours of the chat overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTheme {
    pub name: &'static str,
    pub background_color: Color,
    pub text_color: Color,
    pub bubble_color_own: Color,
    pub bubble_color_other: Color,
    pub bubble_text_color_own: Color,
    pub bubble_text_color_other: Color,
}

impl ChatTheme {
    /// Bubble fill and text colour for a message.
    pub fn bubble_colors(&self, own: bool) -> (Color, Color) {
        if own {
            (self.bubble_color_own, self.bubble_text_color_own)
        } else {
            (self.bubble_color_other, self.bubble_text_color_other)
        }
    }
}

/// Available themes. The first entry is the default.
pub static CHAT_THEMES: [ChatTheme; 6] = [
    ChatTheme {
        name: "Light",
        background_color: Color::WHITE,
        text_color: Color::BLACK,
        bubble_color_own: Color(0xFF19_76D2),
        bubble_color_other: Color(0xFFE3_E3E3),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color::BLACK,
    },
    ChatTheme {
        name: "Dark",
        background_color: Color(0xFF18_1818),
        text_color: Color(0xFFD8_D8D8),
        bubble_color_own: Color(0xFF19_76D2),
        bubble_color_other: Color(0xFF33_3333),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color::WHITE,
    },
    ChatTheme {
        name: "Green",
        background_color: Color(0xFFE8_F5E9),
        text_color: Color(0xFF1B_5E20),
        bubble_color_own: Color(0xFF43_A047),
        bubble_color_other: Color(0xFFC8_E6C9),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color(0xFF1B_5E20),
    },
    ChatTheme {
        name: "Red",
        background_color: Color(0xFFFF_EBEE),
        text_color: Color(0xFFD3_2F2F),
        bubble_color_own: Color(0xFFD3_2F2F),
        bubble_color_other: Color(0xFFFF_CDD2),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color(0xFFD3_2F2F),
    },
    ChatTheme {
        name: "Purple",
        background_color: Color(0xFFF3_E5F5),
        text_color: Color(0xFF6A_1B9A),
        bubble_color_own: Color(0xFF8E_24AA),
        bubble_color_other: Color(0xFFE1_BEE7),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color(0xFF6A_1B9A),
    },
    ChatTheme {
        name: "Dark Purple",
        background_color: Color(0xFF18_1818),
        text_color: Color(0xFF6A_1B9A),
        bubble_color_own: Color(0xFF8E_24AA),
        bubble_color_other: Color(0xFFE1_BEE7),
        bubble_text_color_own: Color::WHITE,
        bubble_text_color_other: Color(0xFF6A_1B9A),
    },
];

pub fn default_theme() -> &'static ChatTheme {
    &CHAT_THEMES[0]
}

/// Exact, case-sensitive lookup; anything unknown gets the default theme.
pub fn resolve(name: Option<&str>) -> &'static ChatTheme {
    name.and_then(|name| CHAT_THEMES.iter().find(|theme| theme.name == name))
        .unwrap_or_else(default_theme)
}

/// Loads and saves the viewer's theme choice in their user record.
#[derive(Clone)]
pub struct ThemePreferences {
    records: Arc<dyn PreferenceStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl ThemePreferences {
    pub fn new(records: Arc<dyn PreferenceStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { records, identity }
    }

    /// Never fails: no user, no stored choice, an unknown name or a read
    /// error all give the default theme.
    pub async fn load_user_theme(&self) -> &'static ChatTheme {
        let Some(user_id) = self.identity.current_user_id() else {
            return default_theme();
        };
        match self.records.get(&user_id, THEME_KEY).await {
            Ok(name) => resolve(name.as_deref()),
            Err(err) => {
                log::warn!("Failed to load chat theme for {user_id}: {err}");
                default_theme()
            }
        }
    }

    /// Persist `name`. Returns `false` when nobody is signed in and nothing
    /// was written.
    pub async fn save_user_theme(&self, name: &str) -> Result<bool, StoreError> {
        let Some(user_id) = self.identity.current_user_id() else {
            log::debug!("No signed-in user; theme `{name}` not persisted");
            return Ok(false);
        };
        self.records.set(&user_id, THEME_KEY, name).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StaticIdentity;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl PreferenceStore for Unreachable {
        async fn get(&self, _: &str, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::UnexpectedResponse("offline".into()))
        }

        async fn set(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
            Err(StoreError::UnexpectedResponse("offline".into()))
        }
    }

    #[test]
    fn resolve_falls_back_to_first_theme() {
        assert_eq!(resolve(Some("Dark")).name, "Dark");
        assert_eq!(resolve(Some("dark")).name, "Light");
        assert_eq!(resolve(Some("Neon")).name, "Light");
        assert_eq!(resolve(None).name, "Light");
    }

    #[test]
    fn hex_round_trip_drops_alpha() {
        assert_eq!(Color(0xFF2B_7E76).to_hex_rgb(), "#2B7E76");
        assert_eq!(Color::from_hex("#2B7E76"), Some(Color(0xFF2B_7E76)));
        assert_eq!(Color::from_hex("#802B7E76"), Some(Color(0x802B_7E76)));
        assert_eq!(Color::from_hex("blue"), None);
    }

    #[test]
    fn hex_rejects_signs() {
        assert_eq!(Color::from_hex("#+12345"), None);
        assert_eq!(Color::from_hex("+1234567"), None);
    }

    #[test]
    fn bubble_colors_follow_ownership() {
        let dark = resolve(Some("Dark"));
        assert_eq!(
            dark.bubble_colors(true),
            (dark.bubble_color_own, dark.bubble_text_color_own)
        );
        assert_eq!(
            dark.bubble_colors(false),
            (dark.bubble_color_other, dark.bubble_text_color_other)
        );
    }

    #[tokio::test]
    async fn read_errors_fall_back_to_default() {
        let prefs = ThemePreferences::new(
            Arc::new(Unreachable),
            Arc::new(StaticIdentity::signed_in("u1", "alice")),
        );
        assert_eq!(prefs.load_user_theme().await.name, "Light");
        assert!(prefs.save_user_theme("Dark").await.is_err());
    }

    #[tokio::test]
    async fn signed_out_viewer_gets_default_and_saves_nothing() {
        let prefs = ThemePreferences::new(Arc::new(Unreachable), Arc::new(StaticIdentity::anonymous()));
        assert_eq!(prefs.load_user_theme().await, default_theme());
        assert!(!prefs.save_user_theme("Dark").await.unwrap());
    }
}
