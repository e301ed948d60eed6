//! Sign-in, sign-out, the current admin and the pre-login allowlist check.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{info, warn};

use super::cookies::{append_cleared_cookies, append_session_cookies, session_tokens};
use super::gate::AdminIdentity;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::email_is_allowlisted;

#[derive(Debug, Deserialize)]
struct CheckEmailPayload {
    email: String,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
}

fn decode_json<T: DeserializeOwned>(body: &Bytes) -> AppResult<T> {
    serde_json::from_slice(body).map_err(|e| AppError::user("invalid_body".to_string(), format!("Invalid request body: {e}")))
}

/// Whether an email may sign in at all; consults the persisted allowlist.
pub async fn check_email(State(state): State<AppState>, body: Bytes) -> AppResult<Json<Value>> {
    let payload: CheckEmailPayload = decode_json(&body)?;
    let allowed = email_is_allowlisted(state.backends.allowlist.as_ref(), &payload.email).await?;
    Ok(Json(json!({ "allowed": allowed })))
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> AppResult<(HeaderMap, Json<Value>)> {
    let payload: LoginPayload = decode_json(&body)?;
    if payload.email.trim().is_empty() || payload.password.is_empty() {
        return Err(AppError::user("missing_credentials", "Email and password are required"));
    }
    let signed_in = state
        .backends
        .auth
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(|e| AppError::upstream("auth_error", e))?;
    let Some((identity, issued)) = signed_in else {
        warn!(target: "auth", "rejected sign-in attempt");
        return Err(AppError::auth("invalid_credentials", "Invalid login credentials"));
    };
    info!(target: "auth", user = %identity.user_id, "signed in");
    let mut headers = HeaderMap::new();
    append_session_cookies(&mut headers, &issued, state.secure_cookies());
    Ok((headers, Json(json!({ "ok": true }))))
}

/// Best-effort provider sign-out; cookies are cleared regardless.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> (HeaderMap, Json<Value>) {
    let tokens = session_tokens(&headers);
    // An expired access token is traded in first so the refresh token dies with it.
    let rotated = match state.backends.auth.resolve(&tokens).await {
        Ok(r) => r.rotated.map(|issued| issued.access_token),
        Err(e) => {
            warn!(target: "auth", "session resolution during sign-out failed: {e}");
            None
        }
    };
    if let Some(access) = rotated.as_deref().or(tokens.access_token.as_deref()) {
        if let Err(e) = state.backends.auth.sign_out(access).await {
            warn!(target: "auth", "provider sign-out failed: {e}");
        }
    }
    let mut out = HeaderMap::new();
    append_cleared_cookies(&mut out, state.secure_cookies());
    (out, Json(json!({ "ok": true })))
}

pub async fn session(AdminIdentity(who): AdminIdentity) -> Json<Value> {
    Json(json!({ "user_id": who.user_id, "email": who.email }))
}
