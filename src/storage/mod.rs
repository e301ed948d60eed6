//!
//! meditations storage module
//! --------------------------
//! Seams to the external collaborators that hold our data: the relational
//! tables (`meditations`, `admin_allowlist`) and the audio bucket. Handlers
//! never talk to a backend directly; they receive a `Backends` handle built
//! once at startup and injected through the router state.
//!
//! Two implementations ship with the crate:
//! - `memory`: in-process tables and bucket (local runs, tests).
//! - `supabase`: PostgREST tables and Supabase Storage over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::identity::AuthProvider;
use crate::meditation::{Meditation, MeditationChanges, NewMeditation};

pub mod keys;
pub mod memory;
pub mod supabase;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Error reported by the backend itself; the message is passed through verbatim.
    #[error("{0}")]
    Upstream(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The `meditations` table.
#[async_trait]
pub trait MeditationStore: Send + Sync {
    /// All rows ordered by `created_at` ascending, optionally only published ones.
    async fn list(&self, published_only: bool) -> StoreResult<Vec<Meditation>>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Meditation>>;

    async fn insert(&self, row: NewMeditation) -> StoreResult<Meditation>;

    /// Returns `None` when no row has this id.
    async fn update(&self, id: Uuid, changes: &MeditationChanges) -> StoreResult<Option<Meditation>>;

    /// Returns whether a row was removed.
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// The `admin_allowlist` table. Callers pass emails already normalized
/// with `identity::normalize_email`.
#[async_trait]
pub trait AllowlistStore: Send + Sync {
    async fn contains(&self, email: &str) -> StoreResult<bool>;
}

/// The private audio bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()>;

    async fn remove(&self, path: &str) -> StoreResult<()>;

    /// Mint a time-limited read URL for a private object.
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String>;
}

/// Explicitly constructed handles to every external collaborator.
#[derive(Clone)]
pub struct Backends {
    pub auth: Arc<dyn AuthProvider>,
    pub meditations: Arc<dyn MeditationStore>,
    pub allowlist: Arc<dyn AllowlistStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// Present only for the in-process bucket, which serves its own signed URLs.
    pub local_objects: Option<Arc<memory::MemoryObjectStore>>,
}
