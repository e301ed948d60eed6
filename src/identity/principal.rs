use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// An authenticated user as reported by the auth provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self { user_id: user_id.into(), email }
    }

    /// Normalized email, `None` when absent or blank.
    pub fn normalized_email(&self) -> Option<String> {
        self.email.as_deref().map(normalize_email).filter(|e| !e.is_empty())
    }
}

/// The single email normalization used everywhere an email is compared:
/// trimmed, NFC-normalized, lowercased.
pub fn normalize_email(email: &str) -> String {
    email.trim().nfc().collect::<String>().to_lowercase()
}
