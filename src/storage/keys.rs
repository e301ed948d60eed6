//! Object key builders and ETag helper for the audio bucket.
//! Keep this module focused and small; complex logic belongs in higher layers.

use uuid::Uuid;
use xxhash_rust::xxh3::xxh3_64;

/// Every audio object lives under this prefix.
pub const AUDIO_PREFIX: &str = "audio/";

const DEFAULT_EXT: &str = "mp3";

/// Collision-resistant object path: `audio/<millis>-<uuid>.<ext>`.
pub fn audio_path(now_millis: i64, file_name: Option<&str>) -> String {
    format!("{}{}-{}.{}", AUDIO_PREFIX, now_millis, Uuid::new_v4(), extension_of(file_name))
}

/// Lowercase extension of an uploaded file name, `mp3` when missing or unusable.
pub fn extension_of(file_name: Option<&str>) -> String {
    let Some(name) = file_name else { return DEFAULT_EXT.to_string(); };
    let Some((_, ext)) = name.rsplit_once('.') else { return DEFAULT_EXT.to_string(); };
    if ext.is_empty() || ext.len() > 10 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return DEFAULT_EXT.to_string();
    }
    ext.to_ascii_lowercase()
}

/// Stable ETag for a byte slice using xxh3_64; returned as fixed-width lowercase hex.
pub fn etag_for_bytes(bytes: &[u8]) -> String {
    let h = xxh3_64(bytes);
    format!("{h:016x}")
}
