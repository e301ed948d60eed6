//!
//! meditations repository
//! ----------------------
//! Create, read, update and delete meditations across the two external
//! collaborators that hold them: the row store and the audio bucket. Writes
//! span both and are not transactional:
//! - create uploads the object, then inserts the row; a failed insert leaves
//!   the object orphaned and logs its path;
//! - delete removes the object, then the row; a failed object removal stops
//!   before touching the row.
//!
//! Inputs are validated before any write.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::model::{
    ALLOWED_MIME, Meditation, MeditationChanges, MeditationView, NewMeditation, is_allowed_mime,
    non_blank, normalize_tags, parse_tags,
};
use super::rotation::{self, day_index};
use crate::error::{AppError, AppResult};
use crate::storage::keys::audio_path;
use crate::storage::{Backends, MeditationStore, ObjectStore};

/// One uploaded audio part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Raw upload form fields as received.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub title: Option<String>,
    pub quote: Option<String>,
    pub tags: Option<String>,
    pub file: Option<AudioUpload>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub title: String,
    pub quote: Option<String>,
    pub tags: Vec<String>,
    pub file: AudioUpload,
}

impl UploadRequest {
    /// Title and file presence first, then the MIME allowlist.
    pub fn validate(self) -> AppResult<ValidatedUpload> {
        let title = self.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let (Some(title), Some(file)) = (title, self.file) else {
            return Err(AppError::user("missing_fields", "Title and audio file are required"));
        };
        if !is_allowed_mime(&file.content_type) {
            return Err(AppError::user(
                "invalid_audio_type".to_string(),
                format!("Invalid audio type: {}. Allowed: {}", file.content_type, ALLOWED_MIME.join(", ")),
            ));
        }
        Ok(ValidatedUpload {
            title,
            quote: non_blank(self.quote).map(|q| q.trim().to_string()),
            tags: self.tags.as_deref().map(parse_tags).unwrap_or_default(),
            file,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum TagsInput {
    List(Vec<String>),
    Csv(String),
}

impl TagsInput {
    fn normalized(&self) -> Vec<String> {
        match self {
            TagsInput::List(v) => normalize_tags(v.iter().map(String::as_str)),
            TagsInput::Csv(s) => parse_tags(s),
        }
    }
}

/// Body of a partial update. Unknown fields are rejected during decoding.
/// An empty `quote` or `transcription` clears the column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeditationPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsInput>,
    #[serde(default)]
    pub transcription: Option<String>,
    #[serde(default)]
    pub published: Option<bool>,
}

impl MeditationPatch {
    pub fn into_changes(self) -> AppResult<MeditationChanges> {
        let title = match self.title {
            Some(t) if t.trim().is_empty() => {
                return Err(AppError::user("empty_title", "Title must not be empty"));
            }
            Some(t) => Some(t.trim().to_string()),
            None => None,
        };
        let changes = MeditationChanges {
            title,
            quote: self.quote.map(|q| non_blank(Some(q)).map(|q| q.trim().to_string())),
            tags: self.tags.map(|t| t.normalized()),
            transcription: self.transcription.map(|t| non_blank(Some(t))),
            published: self.published,
        };
        if changes.is_empty() {
            return Err(AppError::user("nothing_to_update", "Nothing to update"));
        }
        Ok(changes)
    }
}

/// One day of the forward rotation, owning its meditation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScheduleEntry {
    pub date: NaiveDate,
    pub day: i64,
    pub meditation: MeditationView,
}

#[derive(Clone)]
pub struct MeditationRepository {
    store: Arc<dyn MeditationStore>,
    objects: Arc<dyn ObjectStore>,
    signed_url_ttl: Duration,
}

impl MeditationRepository {
    pub fn new(store: Arc<dyn MeditationStore>, objects: Arc<dyn ObjectStore>, signed_url_ttl: Duration) -> Self {
        Self { store, objects, signed_url_ttl }
    }

    pub fn from_backends(b: &Backends, signed_url_ttl: Duration) -> Self {
        Self::new(b.meditations.clone(), b.objects.clone(), signed_url_ttl)
    }

    pub fn signed_url_ttl(&self) -> Duration { self.signed_url_ttl }

    /// Upload the audio then insert the row.
    pub async fn create(&self, upload: ValidatedUpload, now_millis: i64) -> AppResult<Meditation> {
        let path = audio_path(now_millis, upload.file.file_name.as_deref());
        let size = upload.file.bytes.len();
        if let Err(e) = self.objects.upload(&path, upload.file.bytes, &upload.file.content_type).await {
            warn!(target: "meditations", %path, "audio upload failed: {e}");
            return Err(AppError::upstream("upload_failed", e));
        }
        let row = NewMeditation {
            title: upload.title,
            quote: upload.quote,
            tags: upload.tags,
            storage_path: path.clone(),
            mime_type: upload.file.content_type,
        };
        match self.store.insert(row).await {
            Ok(m) => {
                info!(target: "meditations", id = %m.id, %path, size, "meditation created");
                Ok(m)
            }
            Err(e) => {
                error!(target: "meditations", orphaned_object = %path, "row insert failed after upload: {e}");
                Err(AppError::upstream("insert_failed", e))
            }
        }
    }

    /// Rows in `created_at` ascending order, without signed URLs.
    pub async fn rows(&self, published_only: bool) -> AppResult<Vec<Meditation>> {
        Ok(self.store.list(published_only).await?)
    }

    /// Attach a signed URL. Signing failures leave `audio_url` empty.
    pub async fn sign(&self, meditation: Meditation) -> MeditationView {
        let audio_url = match self.objects.create_signed_url(&meditation.storage_path, self.signed_url_ttl).await {
            Ok(u) => Some(u),
            Err(e) => {
                warn!(target: "meditations", id = %meditation.id, "could not sign audio url: {e}");
                None
            }
        };
        MeditationView { meditation, audio_url }
    }

    pub async fn list(&self, published_only: bool) -> AppResult<Vec<MeditationView>> {
        let rows = self.rows(published_only).await?;
        let mut out = Vec::with_capacity(rows.len());
        for m in rows {
            out.push(self.sign(m).await);
        }
        Ok(out)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<MeditationView> {
        match self.store.get(id).await? {
            Some(m) => Ok(self.sign(m).await),
            None => Err(not_found(id)),
        }
    }

    pub async fn update(&self, id: Uuid, changes: &MeditationChanges) -> AppResult<Meditation> {
        if changes.is_empty() {
            return Err(AppError::user("nothing_to_update", "Nothing to update"));
        }
        match self.store.update(id, changes).await {
            Ok(Some(m)) => {
                debug!(target: "meditations", %id, "meditation updated");
                Ok(m)
            }
            Ok(None) => Err(not_found(id)),
            Err(e) => {
                warn!(target: "meditations", %id, "update failed: {e}");
                Err(AppError::upstream("update_failed", e))
            }
        }
    }

    /// Remove the audio object, then the row.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let Some(m) = self.store.get(id).await? else {
            return Err(not_found(id));
        };
        if let Err(e) = self.objects.remove(&m.storage_path).await {
            warn!(target: "meditations", %id, path = %m.storage_path, "audio removal failed, row kept: {e}");
            return Err(AppError::upstream("remove_failed", e));
        }
        match self.store.delete(id).await {
            Ok(true) => {
                info!(target: "meditations", %id, "meditation deleted");
                Ok(())
            }
            Ok(false) => Err(not_found(id)),
            Err(e) => {
                error!(target: "meditations", %id, "row delete failed after audio removal: {e}");
                Err(AppError::upstream("delete_failed", e))
            }
        }
    }

    /// Today's published meditation with its day index.
    pub async fn today(&self, now: DateTime<Utc>) -> AppResult<(i64, Option<MeditationView>)> {
        let day = day_index(now);
        let rows = self.rows(true).await?;
        let picked = match rotation::select_for_day(&rows, day) {
            Some(m) => Some(self.sign(m.clone()).await),
            None => None,
        };
        Ok((day, picked))
    }

    /// Forward rotation starting today for `days` days.
    pub async fn schedule(&self, now: DateTime<Utc>, days: usize) -> AppResult<Vec<ScheduleEntry>> {
        let rows = self.rows(true).await?;
        let mut out = Vec::new();
        for slot in rotation::schedule(&rows, day_index(now), days) {
            out.push(ScheduleEntry { date: slot.date, day: slot.day, meditation: self.sign(slot.item.clone()).await });
        }
        Ok(out)
    }
}

fn not_found(id: Uuid) -> AppError {
    AppError::not_found("not_found".to_string(), format!("Meditation {id} not found"))
}

#[cfg(test)]
#[path = "repo_tests.rs"]
mod repo_tests;
