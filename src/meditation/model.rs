//! Core meditation data contracts (rows persisted in the `meditations` table).
//! Keep this module purely about types/serde and light helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Audio content types accepted by the upload flow.
pub const ALLOWED_MIME: &[&str] = &[
    "audio/mpeg",
    "audio/mp4",
    "audio/wav",
    "audio/ogg",
    "audio/aac",
    "audio/x-m4a",
    "audio/mp4a-latm",
    "audio/x-caf",
    "audio/m4a",
    "audio/x-aac",
    "audio/webm",
];

pub fn is_allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME.contains(&mime)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meditation {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub transcription: Option<String>,
    pub storage_path: String,
    pub mime_type: String,
    #[serde(default)]
    pub published: bool,
    pub created_at: DateTime<Utc>,
}

impl Meditation {
    /// True when the meditation carries every tag in `wanted`.
    pub fn has_all_tags<'a, I>(&self, wanted: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        wanted.into_iter().all(|t| self.tags.iter().any(|have| have == t))
    }
}

/// A validated row ready for insertion. `id` and `created_at` are assigned by the store.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewMeditation {
    pub title: String,
    pub quote: Option<String>,
    pub tags: Vec<String>,
    pub storage_path: String,
    pub mime_type: String,
}

/// Partial update of the mutable columns. `None` leaves a column untouched;
/// `Some(None)` on an optional column clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeditationChanges {
    pub title: Option<String>,
    pub quote: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub transcription: Option<Option<String>>,
    pub published: Option<bool>,
}

impl MeditationChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.quote.is_none()
            && self.tags.is_none()
            && self.transcription.is_none()
            && self.published.is_none()
    }

    /// Apply to an in-memory row.
    pub fn apply_to(&self, m: &mut Meditation) {
        if let Some(t) = &self.title { m.title = t.clone(); }
        if let Some(q) = &self.quote { m.quote = q.clone(); }
        if let Some(tags) = &self.tags { m.tags = tags.clone(); }
        if let Some(tr) = &self.transcription { m.transcription = tr.clone(); }
        if let Some(p) = self.published { m.published = p; }
    }

    /// JSON object holding only the provided columns (cleared optionals become null).
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(t) = &self.title { obj.insert("title".into(), serde_json::json!(t)); }
        if let Some(q) = &self.quote { obj.insert("quote".into(), serde_json::json!(q)); }
        if let Some(tags) = &self.tags { obj.insert("tags".into(), serde_json::json!(tags)); }
        if let Some(tr) = &self.transcription { obj.insert("transcription".into(), serde_json::json!(tr)); }
        if let Some(p) = self.published { obj.insert("published".into(), serde_json::json!(p)); }
        serde_json::Value::Object(obj)
    }
}

/// A meditation as returned to clients: the row plus a short-lived playback URL.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MeditationView {
    #[serde(flatten)]
    pub meditation: Meditation,
    pub audio_url: Option<String>,
}

/// Split a comma-separated tag field: trim, NFC-normalize, drop empties and duplicates.
pub fn parse_tags(raw: &str) -> Vec<String> {
    normalize_tags(raw.split(','))
}

pub fn normalize_tags<'a, I>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();
    for t in tags {
        let t = t.trim();
        if t.is_empty() { continue; }
        let t: String = t.nfc().collect();
        if !out.contains(&t) { out.push(t); }
    }
    out
}

/// Empty or whitespace-only optional text becomes `None`.
pub fn non_blank(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tags: &[&str]) -> Meditation {
        Meditation {
            id: Uuid::nil(),
            title: "Morning Light".into(),
            quote: None,
            tags: tags.iter().map(|s| s.to_string()).collect(),
            transcription: None,
            storage_path: "audio/1-x.mp3".into(),
            mime_type: "audio/mpeg".into(),
            published: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn tags_are_trimmed_and_empties_dropped() {
        assert_eq!(parse_tags(" calm , ,sleep,, calm "), vec!["calm", "sleep"]);
        assert!(parse_tags("").is_empty());
        assert!(parse_tags(" , ").is_empty());
    }

    #[test]
    fn tags_are_nfc_normalized() {
        let tags = parse_tags("Cafe\u{0301}");
        assert_eq!(tags, vec!["Café"]);
    }

    #[test]
    fn mime_allowlist() {
        assert!(is_allowed_mime("audio/mpeg"));
        assert!(is_allowed_mime("audio/x-m4a"));
        assert!(!is_allowed_mime("video/mp4"));
        assert!(!is_allowed_mime("AUDIO/MPEG"));
    }

    #[test]
    fn has_all_tags_is_conjunctive() {
        let m = sample(&["a", "b"]);
        let ab = vec!["a".to_string(), "b".to_string()];
        let a = vec!["a".to_string()];
        let ac = vec!["a".to_string(), "c".to_string()];
        assert!(m.has_all_tags(&ab));
        assert!(m.has_all_tags(&a));
        assert!(!m.has_all_tags(&ac));
    }

    #[test]
    fn changes_json_only_carries_provided_fields() {
        let ch = MeditationChanges { quote: Some(None), published: Some(true), ..Default::default() };
        let v = ch.to_json();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert!(obj["quote"].is_null());
        assert_eq!(obj["published"], serde_json::json!(true));
        assert!(MeditationChanges::default().is_empty());
    }

    #[test]
    fn view_flattens_row() {
        let v = MeditationView { meditation: sample(&[]), audio_url: Some("http://x/y".into()) };
        let j = serde_json::to_value(&v).unwrap();
        assert_eq!(j["title"], "Morning Light");
        assert_eq!(j["audio_url"], "http://x/y");
    }
}
