use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;

use crate::tprintln;
use super::principal::Identity;

/// Refresh tokens outlive access tokens; a refresh rotates both.
const REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Tokens a client presented on a request (cookies).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn is_empty(&self) -> bool { self.access_token.is_none() && self.refresh_token.is_none() }
}

/// A freshly issued (or rotated) token pair to hand back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub identity: Identity,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

#[derive(Debug, Clone)]
struct RefreshEntry {
    access_token: String,
    identity: Identity,
    expires_at: Instant,
}

/// 256-bit random token, base64url without padding.
pub fn gen_id() -> String {
    let mut buf = [0u8; 32];
    if getrandom::getrandom(&mut buf).is_err() {
        // OS entropy unavailable: fall back to two v4 uuids
        buf[..16].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
        buf[16..].copy_from_slice(uuid::Uuid::new_v4().as_bytes());
    }
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// In-process session table. Cloning shares the same maps.
#[derive(Clone)]
pub struct SessionManager {
    pub ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, Session>>>,
    refresh: Arc<RwLock<HashMap<String, RefreshEntry>>>,
    user_index: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            refresh: Arc::new(RwLock::new(HashMap::new())),
            user_index: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn issue(&self, identity: Identity) -> IssuedSession {
        let now = Instant::now();
        let sid = gen_id();
        let access = gen_id();
        let refresh = gen_id();
        let sess = Session {
            session_id: sid.clone(),
            access_token: access.clone(),
            refresh_token: refresh.clone(),
            identity: identity.clone(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(access.clone(), sess);
        self.refresh.write().insert(
            refresh.clone(),
            RefreshEntry { access_token: access.clone(), identity: identity.clone(), expires_at: now + REFRESH_TTL },
        );
        self.user_index
            .write()
            .entry(identity.user_id.clone())
            .or_insert_with(HashSet::new)
            .insert(access.clone());
        tprintln!("session.issue user={} sid={} ttl_secs={}", identity.user_id, sid, self.ttl.as_secs());
        IssuedSession { access_token: access, refresh_token: refresh, expires_in: self.ttl }
    }

    pub fn validate(&self, access_token: &str) -> Option<Identity> {
        let now = Instant::now();
        let mut expired = false;
        let out = {
            let map = self.sessions.read();
            match map.get(access_token) {
                Some(s) if s.expires_at > now => Some(s.identity.clone()),
                Some(_) => { expired = true; None }
                None => None,
            }
        };
        if expired {
            // The refresh token stays valid so the client can rotate.
            self.sessions.write().remove(access_token);
        }
        out
    }

    /// Consume a refresh token and issue a new pair. The previous access token is revoked.
    pub fn refresh(&self, refresh_token: &str) -> Option<(Identity, IssuedSession)> {
        let entry = self.refresh.write().remove(refresh_token)?;
        if entry.expires_at <= Instant::now() { return None; }
        self.drop_access(&entry.access_token);
        let issued = self.issue(entry.identity.clone());
        tprintln!("session.refresh user={}", entry.identity.user_id);
        Some((entry.identity, issued))
    }

    pub fn logout(&self, access_token: &str) -> bool {
        let Some(sess) = self.sessions.write().remove(access_token) else { return false; };
        self.refresh.write().remove(&sess.refresh_token);
        if let Some(set) = self.user_index.write().get_mut(&sess.identity.user_id) {
            set.remove(access_token);
        }
        true
    }

    /// Revoke every session of a user; returns how many were live.
    pub fn revoke_user(&self, user_id: &str) -> usize {
        let tokens = self.user_index.write().remove(user_id).unwrap_or_default();
        let mut count = 0usize;
        {
            let mut s = self.sessions.write();
            for t in tokens.iter() {
                if s.remove(t).is_some() { count += 1; }
            }
        }
        self.refresh.write().retain(|_, e| e.identity.user_id != user_id);
        tprintln!("session.revoke user={} count={}", user_id, count);
        count
    }

    /// Drop expired access sessions and refresh entries; returns how many went.
    /// An expired access session whose refresh entry is still live only loses
    /// its access half, so the client can still rotate.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let dead: Vec<String> = self
            .sessions
            .read()
            .iter()
            .filter(|(_, s)| s.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for t in &dead {
            self.drop_access(t);
        }
        let mut refresh = self.refresh.write();
        let before = refresh.len();
        refresh.retain(|_, e| e.expires_at > now);
        let removed = dead.len() + (before - refresh.len());
        drop(refresh);
        self.user_index.write().retain(|_, set| !set.is_empty());
        tprintln!("session.sweep removed={}", removed);
        removed
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }

    fn drop_access(&self, access_token: &str) {
        if let Some(sess) = self.sessions.write().remove(access_token) {
            if let Some(set) = self.user_index.write().get_mut(&sess.identity.user_id) {
                set.remove(access_token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn who() -> Identity { Identity::new("u1", Some("mama@example.com".into())) }

    #[test]
    fn issue_then_validate() {
        let sm = SessionManager::default();
        let s = sm.issue(who());
        assert_eq!(sm.validate(&s.access_token), Some(who()));
        assert_eq!(sm.validate("nope"), None);
    }

    #[test]
    fn expired_access_can_be_refreshed_once() {
        let sm = SessionManager::new(Duration::from_millis(0));
        let s = sm.issue(who());
        assert_eq!(sm.validate(&s.access_token), None);
        let (id, rotated) = sm.refresh(&s.refresh_token).expect("refresh");
        assert_eq!(id, who());
        assert_ne!(rotated.refresh_token, s.refresh_token);
        assert!(sm.refresh(&s.refresh_token).is_none(), "refresh tokens are single use");
    }

    #[test]
    fn logout_revokes_both_tokens() {
        let sm = SessionManager::default();
        let s = sm.issue(who());
        assert!(sm.logout(&s.access_token));
        assert_eq!(sm.validate(&s.access_token), None);
        assert!(sm.refresh(&s.refresh_token).is_none());
        assert!(!sm.logout(&s.access_token));
    }

    #[test]
    fn sweep_drops_expired_access_but_keeps_refresh() {
        let sm = SessionManager::new(Duration::ZERO);
        let s = sm.issue(who());
        assert_eq!(sm.len(), 1);
        assert_eq!(sm.sweep_expired(), 1);
        assert!(sm.is_empty());
        assert!(sm.refresh(&s.refresh_token).is_some(), "refresh entry outlives the access half");

        let live = SessionManager::default();
        live.issue(who());
        assert_eq!(live.sweep_expired(), 0);
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn revoke_user_counts_live_sessions() {
        let sm = SessionManager::default();
        sm.issue(who());
        sm.issue(who());
        assert_eq!(sm.revoke_user("u1"), 2);
        assert_eq!(sm.revoke_user("u1"), 0);
    }
}
