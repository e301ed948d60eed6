use std::collections::HashMap;

use anyhow::{anyhow, Result};
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use uuid::Uuid;

use crate::tprintln;
use super::principal::{normalize_email, Identity};
use super::session::{IssuedSession, SessionManager, SessionTokens};

/// Outcome of resolving a request's session cookies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSession {
    pub identity: Option<Identity>,
    /// Set when resolution rotated the token pair; the caller must hand it back.
    pub rotated: Option<IssuedSession>,
}

/// External session mechanism: issues, validates, refreshes and revokes sessions.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the presented tokens, refreshing an expired access token when
    /// a refresh token is available.
    async fn resolve(&self, tokens: &SessionTokens) -> Result<ResolvedSession>;

    /// `Ok(None)` means the credentials were rejected.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<(Identity, IssuedSession)>>;

    async fn sign_out(&self, access_token: &str) -> Result<()>;

    /// Drop expired session state held in-process; hosted providers hold none.
    fn sweep_expired(&self) -> usize { 0 }
}

pub fn hash_password(password: &str) -> Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2.hash_password(password.as_bytes(), &salt).map_err(|e| anyhow!(e.to_string()))?.to_string();
    Ok(phc)
}

fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Clone)]
struct LocalUser {
    user_id: String,
    email: String,
    password_hash: String,
}

/// In-process auth backend: email/password users with Argon2 PHC hashes.
pub struct LocalAuthProvider {
    users: RwLock<HashMap<String, LocalUser>>,
    pub sm: SessionManager,
}

impl LocalAuthProvider {
    pub fn new(sm: SessionManager) -> Self { Self { users: RwLock::new(HashMap::new()), sm } }

    /// Create or replace a user; returns its identity.
    pub fn register(&self, email: &str, password: &str) -> Result<Identity> {
        let key = normalize_email(email);
        if key.is_empty() { return Err(anyhow!("email must not be empty")); }
        let password_hash = hash_password(password)?;
        let mut users = self.users.write();
        let user_id = users.get(&key).map(|u| u.user_id.clone()).unwrap_or_else(|| Uuid::new_v4().to_string());
        let user = LocalUser { user_id: user_id.clone(), email: email.trim().to_string(), password_hash };
        users.insert(key, user);
        Ok(Identity::new(user_id, Some(email.trim().to_string())))
    }

    pub fn user_count(&self) -> usize { self.users.read().len() }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn resolve(&self, tokens: &SessionTokens) -> Result<ResolvedSession> {
        if let Some(access) = tokens.access_token.as_deref() {
            if let Some(identity) = self.sm.validate(access) {
                return Ok(ResolvedSession { identity: Some(identity), rotated: None });
            }
        }
        if let Some(refresh) = tokens.refresh_token.as_deref() {
            if let Some((identity, issued)) = self.sm.refresh(refresh) {
                return Ok(ResolvedSession { identity: Some(identity), rotated: Some(issued) });
            }
        }
        Ok(ResolvedSession::default())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<(Identity, IssuedSession)>> {
        let user = self.users.read().get(&normalize_email(email)).cloned();
        let Some(user) = user else { return Ok(None); };
        if !verify_password(&user.password_hash, password) {
            return Ok(None);
        }
        let identity = Identity::new(user.user_id, Some(user.email));
        let issued = self.sm.issue(identity.clone());
        tprintln!("auth.login user={}", identity.user_id);
        Ok(Some((identity, issued)))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        self.sm.logout(access_token);
        Ok(())
    }

    fn sweep_expired(&self) -> usize { self.sm.sweep_expired() }
}
