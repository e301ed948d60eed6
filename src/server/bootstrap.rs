//! Startup wiring: build the backend handles named by the configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::{AppConfig, BackendKind};
use crate::identity::{GoTrueAuthProvider, LocalAuthProvider, SessionManager};
use crate::storage::memory::{MemoryAllowlist, MemoryMeditationStore, MemoryObjectStore};
use crate::storage::supabase::SupabaseClient;
use crate::storage::Backends;

/// Concrete in-process backends, kept typed so callers can seed and inspect them.
#[derive(Clone)]
pub struct MemoryBackends {
    pub auth: Arc<LocalAuthProvider>,
    pub meditations: Arc<MemoryMeditationStore>,
    pub allowlist: Arc<MemoryAllowlist>,
    pub objects: Arc<MemoryObjectStore>,
}

impl MemoryBackends {
    pub fn new(public_url: &str, session_ttl: Duration) -> Self {
        Self {
            auth: Arc::new(LocalAuthProvider::new(SessionManager::new(session_ttl))),
            meditations: Arc::new(MemoryMeditationStore::new()),
            allowlist: Arc::new(MemoryAllowlist::default()),
            objects: Arc::new(MemoryObjectStore::new(public_url)),
        }
    }

    pub fn backends(&self) -> Backends {
        Backends {
            auth: self.auth.clone(),
            meditations: self.meditations.clone(),
            allowlist: self.allowlist.clone(),
            objects: self.objects.clone(),
            local_objects: Some(self.objects.clone()),
        }
    }
}

pub fn build_backends(config: &AppConfig) -> Result<Backends> {
    match config.backend {
        BackendKind::Memory => Ok(memory_backends(config)?.backends()),
        BackendKind::Supabase => supabase_backends(config),
    }
}

/// In-process backends seeded from `ALLOWED_ADMIN_EMAILS`.
pub fn memory_backends(config: &AppConfig) -> Result<MemoryBackends> {
    let mem = MemoryBackends::new(&config.public_url, config.session_ttl);
    for email in &config.allowed_admin_emails {
        mem.allowlist.add(email);
        if let Some(pw) = &config.admin_password {
            mem.auth.register(email, pw).with_context(|| format!("registering admin {email}"))?;
        }
    }
    if config.admin_password.is_none() && !config.allowed_admin_emails.is_empty() {
        warn!("MEDITATIONS_ADMIN_PASSWORD is unset; allowlisted admins cannot sign in");
    }
    info!(admins = mem.allowlist.len(), "memory backend ready");
    Ok(mem)
}

fn supabase_backends(config: &AppConfig) -> Result<Backends> {
    let sb = config.supabase.as_ref().context("supabase backend selected without SUPABASE_* settings")?;
    let http = reqwest::Client::builder().build().context("building HTTP client")?;
    let client = Arc::new(SupabaseClient::new(http.clone(), &sb.url, &sb.service_role_key, &config.bucket));
    let auth = Arc::new(GoTrueAuthProvider::new(http, &sb.url, &sb.anon_key));
    if !config.allowed_admin_emails.is_empty() {
        warn!("ALLOWED_ADMIN_EMAILS is ignored by the supabase backend; admin_allowlist table is authoritative");
    }
    info!(url = %sb.url, bucket = %config.bucket, "supabase backend ready");
    Ok(Backends {
        auth,
        meditations: client.clone(),
        allowlist: client.clone(),
        objects: client,
        local_objects: None,
    })
}
