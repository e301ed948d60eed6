//!
//! admin access gate
//! -----------------
//! Every `/admin/*` page and admin API call resolves the session cookies and
//! checks the allowlist before the handler runs:
//! - pages answer denials with a `303` to the login or not-authorized page;
//! - API routes answer `401`/`403` JSON.
//!
//! Tokens rotated while resolving are written back on whatever response
//! goes out, including redirects and bypassed pages.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use tracing::{debug, error};

use super::cookies::{append_session_cookies, session_tokens};
use super::AppState;
use crate::error::AppError;
use crate::identity::{AdminCheck, DenyReason, Identity, IssuedSession, require_admin};

pub const LOGIN_PATH: &str = "/admin/login";
pub const NOT_AUTHORIZED_PATH: &str = "/admin/not-authorized";

/// Pages reachable without an admin session.
pub fn is_bypass_path(path: &str) -> bool {
    path == LOGIN_PATH || path == NOT_AUTHORIZED_PATH
}

/// The allowlisted caller, available to handlers behind the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity(pub Identity);

struct GateOutcome {
    check: AdminCheck,
    rotated: Option<IssuedSession>,
    lookup_failed: bool,
}

async fn resolve(state: &AppState, headers: &HeaderMap) -> GateOutcome {
    let tokens = session_tokens(headers);
    let (check, resolved) =
        require_admin(state.backends.auth.as_ref(), state.backends.allowlist.as_ref(), &tokens).await;
    match check {
        Ok(check) => GateOutcome { check, rotated: resolved.rotated, lookup_failed: false },
        Err(e) => {
            error!(target: "authz", "allowlist lookup failed: {e}");
            GateOutcome {
                check: AdminCheck::Denied(DenyReason::NotAllowlisted),
                rotated: resolved.rotated,
                lookup_failed: true,
            }
        }
    }
}

fn with_rotation(mut resp: Response, rotated: Option<&IssuedSession>, secure: bool) -> Response {
    if let Some(issued) = rotated {
        append_session_cookies(resp.headers_mut(), issued, secure);
    }
    resp
}

/// Middleware for the `/admin` page tree.
pub async fn admin_pages(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let outcome = resolve(&state, req.headers()).await;
    let resp = if is_bypass_path(&path) {
        next.run(req).await
    } else {
        match outcome.check {
            AdminCheck::Allowed(id) => {
                req.extensions_mut().insert(AdminIdentity(id));
                next.run(req).await
            }
            AdminCheck::Denied(DenyReason::Unauthenticated) => {
                debug!(target: "authz", %path, "no session, redirecting to login");
                Redirect::to(LOGIN_PATH).into_response()
            }
            AdminCheck::Denied(DenyReason::NotAllowlisted) => {
                debug!(target: "authz", %path, "not allowlisted, redirecting");
                Redirect::to(NOT_AUTHORIZED_PATH).into_response()
            }
        }
    };
    with_rotation(resp, outcome.rotated.as_ref(), state.secure_cookies())
}

/// Middleware for the admin JSON API.
pub async fn admin_api(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let outcome = resolve(&state, req.headers()).await;
    let resp = if outcome.lookup_failed {
        AppError::internal("allowlist_unavailable", "Could not verify admin access").into_response()
    } else {
        match outcome.check.into_result() {
            Ok(id) => {
                req.extensions_mut().insert(AdminIdentity(id));
                next.run(req).await
            }
            Err(e) => e.into_response(),
        }
    };
    with_rotation(resp, outcome.rotated.as_ref(), state.secure_cookies())
}

impl FromRequestParts<AppState> for AdminIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<AdminIdentity>() {
            return Ok(id.clone());
        }
        // Not behind a gate layer: run the check here.
        let outcome = resolve(state, &parts.headers).await;
        let rejection = if outcome.lookup_failed {
            AppError::internal("allowlist_unavailable", "Could not verify admin access").into_response()
        } else {
            match outcome.check.into_result() {
                Ok(id) => return Ok(AdminIdentity(id)),
                Err(e) => e.into_response(),
            }
        };
        Err(with_rotation(rejection, outcome.rotated.as_ref(), state.secure_cookies()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_is_exact() {
        assert!(is_bypass_path("/admin/login"));
        assert!(is_bypass_path("/admin/not-authorized"));
        assert!(!is_bypass_path("/admin/login/extra"));
        assert!(!is_bypass_path("/admin"));
        assert!(!is_bypass_path("/admin/meditations"));
    }
}
