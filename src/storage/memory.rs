//! In-process backends: meditation table, allowlist table and audio bucket.
//!
//! Each store owns its maps behind `parking_lot::RwLock`s; guards are never
//! held across an `.await`. The bucket issues opaque signed tokens with an
//! expiry and serves them itself through `/storage/signed/{token}`.
//! Failure switches let tests exercise the partial-failure paths of the
//! repository without a real backend.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::keys::etag_for_bytes;
use super::{AllowlistStore, MeditationStore, ObjectStore, StoreError, StoreResult};
use crate::identity::{gen_id, normalize_email};
use crate::meditation::{Meditation, MeditationChanges, NewMeditation};

// ------------------------
// meditations table
// ------------------------

#[derive(Default)]
pub struct MemoryMeditationStore {
    /// Kept sorted by `created_at` ascending.
    rows: RwLock<Vec<Meditation>>,
    last_created: Mutex<Option<DateTime<Utc>>>,
    fail_inserts: AtomicBool,
    fail_deletes: AtomicBool,
}

impl MemoryMeditationStore {
    pub fn new() -> Self { Self::default() }

    /// Insert a fully-formed row (explicit id, timestamp and publish flag).
    pub fn seed(&self, row: Meditation) {
        let mut rows = self.rows.write();
        rows.retain(|m| m.id != row.id);
        rows.push(row);
        rows.sort_by_key(|m| m.created_at);
    }

    pub fn len(&self) -> usize { self.rows.read().len() }

    pub fn is_empty(&self) -> bool { self.rows.read().is_empty() }

    pub fn set_fail_inserts(&self, fail: bool) { self.fail_inserts.store(fail, Ordering::SeqCst); }

    pub fn set_fail_deletes(&self, fail: bool) { self.fail_deletes.store(fail, Ordering::SeqCst); }

    /// Strictly increasing creation timestamps so ordering is total.
    fn next_created_at(&self) -> DateTime<Utc> {
        let mut last = self.last_created.lock();
        let mut now = Utc::now();
        if let Some(prev) = *last {
            if now <= prev { now = prev + chrono::Duration::microseconds(1); }
        }
        *last = Some(now);
        now
    }
}

#[async_trait]
impl MeditationStore for MemoryMeditationStore {
    async fn list(&self, published_only: bool) -> StoreResult<Vec<Meditation>> {
        let rows = self.rows.read();
        Ok(rows.iter().filter(|m| !published_only || m.published).cloned().collect())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Meditation>> {
        Ok(self.rows.read().iter().find(|m| m.id == id).cloned())
    }

    async fn insert(&self, row: NewMeditation) -> StoreResult<Meditation> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Upstream("insert rejected by meditations table".into()));
        }
        if self.rows.read().iter().any(|m| m.storage_path == row.storage_path) {
            return Err(StoreError::Upstream(format!("duplicate storage_path: {}", row.storage_path)));
        }
        let m = Meditation {
            id: Uuid::new_v4(),
            title: row.title,
            quote: row.quote,
            tags: row.tags,
            transcription: None,
            storage_path: row.storage_path,
            mime_type: row.mime_type,
            published: false,
            created_at: self.next_created_at(),
        };
        self.seed(m.clone());
        Ok(m)
    }

    async fn update(&self, id: Uuid, changes: &MeditationChanges) -> StoreResult<Option<Meditation>> {
        let mut rows = self.rows.write();
        let Some(m) = rows.iter_mut().find(|m| m.id == id) else { return Ok(None); };
        changes.apply_to(m);
        Ok(Some(m.clone()))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Upstream("delete rejected by meditations table".into()));
        }
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|m| m.id != id);
        Ok(rows.len() != before)
    }
}

// ------------------------
// admin_allowlist table
// ------------------------

#[derive(Default)]
pub struct MemoryAllowlist {
    emails: RwLock<HashSet<String>>,
}

impl MemoryAllowlist {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set = emails
            .into_iter()
            .map(|e| normalize_email(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails: RwLock::new(set) }
    }

    pub fn add(&self, email: &str) { self.emails.write().insert(normalize_email(email)); }

    pub fn remove(&self, email: &str) -> bool { self.emails.write().remove(&normalize_email(email)) }

    pub fn len(&self) -> usize { self.emails.read().len() }

    pub fn is_empty(&self) -> bool { self.emails.read().is_empty() }
}

#[async_trait]
impl AllowlistStore for MemoryAllowlist {
    async fn contains(&self, email: &str) -> StoreResult<bool> {
        Ok(self.emails.read().contains(email))
    }
}

// ------------------------
// audio bucket
// ------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub etag: String,
}

#[derive(Debug, Clone)]
struct SignedGrant {
    path: String,
    expires_at: Instant,
}

pub struct MemoryObjectStore {
    /// Public origin used to build signed URLs, without trailing slash.
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
    grants: RwLock<HashMap<String, SignedGrant>>,
    fail_uploads: AtomicBool,
    fail_removes: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: RwLock::new(HashMap::new()),
            grants: RwLock::new(HashMap::new()),
            fail_uploads: AtomicBool::new(false),
            fail_removes: AtomicBool::new(false),
        }
    }

    pub fn contains(&self, path: &str) -> bool { self.objects.read().contains_key(path) }

    pub fn object_count(&self) -> usize { self.objects.read().len() }

    pub fn paths(&self) -> Vec<String> {
        let mut v: Vec<String> = self.objects.read().keys().cloned().collect();
        v.sort();
        v
    }

    pub fn set_fail_uploads(&self, fail: bool) { self.fail_uploads.store(fail, Ordering::SeqCst); }

    pub fn set_fail_removes(&self, fail: bool) { self.fail_removes.store(fail, Ordering::SeqCst); }

    /// Resolve a signed token to its object. Expired grants are dropped.
    pub fn fetch_signed(&self, token: &str) -> Option<StoredObject> {
        let now = Instant::now();
        let mut drop_key: Option<String> = None;
        let path = {
            let grants = self.grants.read();
            match grants.get(token) {
                Some(g) if g.expires_at > now => Some(g.path.clone()),
                Some(_) => { drop_key = Some(token.to_string()); None }
                None => None,
            }
        };
        if let Some(k) = drop_key {
            self.grants.write().remove(&k);
        }
        let path = path?;
        self.objects.read().get(&path).cloned()
    }

    /// Drop every expired grant; returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut grants = self.grants.write();
        let before = grants.len();
        grants.retain(|_, g| g.expires_at > now);
        before - grants.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StoreError::Upstream("bucket rejected upload".into()));
        }
        let mut objects = self.objects.write();
        if objects.contains_key(path) {
            return Err(StoreError::Upstream("The resource already exists".into()));
        }
        let etag = etag_for_bytes(&bytes);
        objects.insert(path.to_string(), StoredObject { bytes, content_type: content_type.to_string(), etag });
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StoreError::Upstream("bucket rejected remove".into()));
        }
        self.objects.write().remove(path);
        self.grants.write().retain(|_, g| g.path != path);
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String> {
        if !self.contains(path) {
            return Err(StoreError::Upstream("Object not found".into()));
        }
        let token = gen_id();
        let grant = SignedGrant { path: path.to_string(), expires_at: Instant::now() + ttl };
        self.grants.write().insert(token.clone(), grant);
        Ok(format!("{}/storage/signed/{}", self.base_url, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_row(path: &str) -> NewMeditation {
        NewMeditation {
            title: "t".into(),
            quote: None,
            tags: vec![],
            storage_path: path.into(),
            mime_type: "audio/mpeg".into(),
        }
    }

    #[tokio::test]
    async fn inserts_are_ordered_by_creation() {
        let store = MemoryMeditationStore::new();
        let a = store.insert(new_row("audio/a.mp3")).await.unwrap();
        let b = store.insert(new_row("audio/b.mp3")).await.unwrap();
        assert!(a.created_at < b.created_at);
        let all = store.list(false).await.unwrap();
        assert_eq!(all.iter().map(|m| m.id).collect::<Vec<_>>(), vec![a.id, b.id]);
        assert!(store.list(true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_missing_row_is_none() {
        let store = MemoryMeditationStore::new();
        let ch = MeditationChanges { title: Some("x".into()), ..Default::default() };
        assert!(store.update(Uuid::new_v4(), &ch).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn allowlist_normalizes_seed_emails() {
        let list = MemoryAllowlist::new([" Mama@Example.com ", ""]);
        assert_eq!(list.len(), 1);
        assert!(list.contains("mama@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn signed_urls_resolve_until_expiry() {
        let bucket = MemoryObjectStore::new("http://localhost:8080/");
        bucket.upload("audio/x.mp3", b"abc".to_vec(), "audio/mpeg").await.unwrap();
        let url = bucket.create_signed_url("audio/x.mp3", Duration::from_secs(60)).await.unwrap();
        assert!(url.starts_with("http://localhost:8080/storage/signed/"));
        let token = url.rsplit('/').next().unwrap();
        let obj = bucket.fetch_signed(token).unwrap();
        assert_eq!(obj.bytes, b"abc");
        assert_eq!(obj.content_type, "audio/mpeg");

        let short = bucket.create_signed_url("audio/x.mp3", Duration::from_millis(0)).await.unwrap();
        let short_token = short.rsplit('/').next().unwrap();
        assert!(bucket.fetch_signed(short_token).is_none());
    }

    #[tokio::test]
    async fn remove_revokes_grants() {
        let bucket = MemoryObjectStore::new("http://h");
        bucket.upload("audio/x.mp3", b"abc".to_vec(), "audio/mpeg").await.unwrap();
        let url = bucket.create_signed_url("audio/x.mp3", Duration::from_secs(60)).await.unwrap();
        bucket.remove("audio/x.mp3").await.unwrap();
        let token = url.rsplit('/').next().unwrap();
        assert!(bucket.fetch_signed(token).is_none());
        assert_eq!(bucket.object_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_upload_is_rejected() {
        let bucket = MemoryObjectStore::new("http://h");
        bucket.upload("audio/x.mp3", b"a".to_vec(), "audio/mpeg").await.unwrap();
        assert!(bucket.upload("audio/x.mp3", b"b".to_vec(), "audio/mpeg").await.is_err());
    }
}
