use anyhow::Result;
use tracing::{debug, warn};

use super::principal::{normalize_email, Identity};
use super::provider::{AuthProvider, ResolvedSession};
use super::session::SessionTokens;
use crate::error::AppError;
use crate::storage::AllowlistStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// No session, or a session without an email.
    Unauthenticated,
    /// Authenticated, but the email is not on the allowlist.
    NotAllowlisted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCheck {
    Allowed(Identity),
    Denied(DenyReason),
}

impl AdminCheck {
    pub fn is_allowed(&self) -> bool { matches!(self, AdminCheck::Allowed(_)) }

    /// API mapping: 401 for missing auth, 403 for a known but unlisted user.
    pub fn into_result(self) -> Result<Identity, AppError> {
        match self {
            AdminCheck::Allowed(id) => Ok(id),
            AdminCheck::Denied(DenyReason::Unauthenticated) => Err(AppError::auth("not_authenticated", "Not authenticated")),
            AdminCheck::Denied(DenyReason::NotAllowlisted) => Err(AppError::forbidden("not_authorized", "Not authorized")),
        }
    }
}

/// Decide admission for an (optional) identity by allowlist membership.
pub async fn check_allowlist(allowlist: &dyn AllowlistStore, identity: Option<Identity>) -> Result<AdminCheck> {
    let Some(identity) = identity else { return Ok(AdminCheck::Denied(DenyReason::Unauthenticated)); };
    let Some(email) = identity.normalized_email() else {
        return Ok(AdminCheck::Denied(DenyReason::Unauthenticated));
    };
    if allowlist.contains(&email).await? {
        debug!(target: "authz", user = %identity.user_id, "allowlisted");
        Ok(AdminCheck::Allowed(identity))
    } else {
        warn!(target: "authz", user = %identity.user_id, "authenticated user is not allowlisted");
        Ok(AdminCheck::Denied(DenyReason::NotAllowlisted))
    }
}

/// Resolve the session and run the allowlist check. Errors resolving the
/// session count as "no identity". An allowlist error is returned next to the
/// resolved session so tokens rotated during resolution still reach the client.
pub async fn require_admin(
    auth: &dyn AuthProvider,
    allowlist: &dyn AllowlistStore,
    tokens: &SessionTokens,
) -> (Result<AdminCheck>, ResolvedSession) {
    let resolved = match auth.resolve(tokens).await {
        Ok(r) => r,
        Err(e) => {
            warn!(target: "authz", "session resolution failed, treating as anonymous: {e}");
            ResolvedSession::default()
        }
    };
    let check = check_allowlist(allowlist, resolved.identity.clone()).await;
    (check, resolved)
}

/// Pre-login check used by the login page: is this email allowlisted at all?
pub async fn email_is_allowlisted(allowlist: &dyn AllowlistStore, email: &str) -> Result<bool> {
    let email = normalize_email(email);
    if email.is_empty() { return Ok(false); }
    Ok(allowlist.contains(&email).await?)
}
