//! Typed preference keys on top of the key-value capability.

use serde::{Deserialize, Serialize};

use crate::capabilities::{KeyNamespace, KvError, KvKey};
use crate::model::Theme;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PreferenceKey {
    Theme,
    RememberedEmail,
    /// Written by older builds next to the email. Only ever deleted.
    LegacyRememberedPassword,
}

impl PreferenceKey {
    /// Keys read back at start-up.
    pub const RESTORED: [PreferenceKey; 2] = [Self::Theme, Self::RememberedEmail];

    const fn parts(self) -> (KeyNamespace, &'static str) {
        match self {
            Self::Theme => (KeyNamespace::Settings, "theme"),
            Self::RememberedEmail => (KeyNamespace::Session, "remembered_email"),
            Self::LegacyRememberedPassword => (KeyNamespace::Session, "remembered_password"),
        }
    }

    pub fn kv_key(self) -> Result<KvKey, KvError> {
        let (namespace, key) = self.parts();
        KvKey::new(namespace, key)
    }
}

/// Reads a stored theme, ignoring values this build does not know.
#[must_use]
pub fn parse_theme(stored: Option<&str>) -> Option<Theme> {
    stored.and_then(Theme::parse)
}

/// Email to persist for "remember me", or `None` when nothing should be kept.
#[must_use]
pub fn remembered_email(email: &str, remember: bool) -> Option<String> {
    let email = email.trim();
    (remember && !email.is_empty()).then(|| email.to_string())
}
