//! Session cookie helpers: read the token pair off a request, write it back.

use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use tracing::warn;

use crate::identity::{IssuedSession, SessionTokens};

pub const ACCESS_COOKIE: &str = "meditations_access";
pub const REFRESH_COOKIE: &str = "meditations_refresh";

const REFRESH_MAX_AGE_SECS: u64 = 30 * 24 * 60 * 60;

pub fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for cookie in headers.get_all(COOKIE) {
        let Ok(s) = cookie.to_str() else { continue; };
        for part in s.split(';') {
            let p = part.trim();
            if let Some((k, v)) = p.split_once('=') {
                if k == name && !v.is_empty() { return Some(v.to_string()); }
            }
        }
    }
    None
}

pub fn session_tokens(headers: &HeaderMap) -> SessionTokens {
    SessionTokens {
        access_token: parse_cookie(headers, ACCESS_COOKIE),
        refresh_token: parse_cookie(headers, REFRESH_COOKIE),
    }
}

fn attrs(secure: bool) -> &'static str {
    if secure { "HttpOnly; Secure; SameSite=Lax; Path=/" } else { "HttpOnly; SameSite=Lax; Path=/" }
}

fn cookie_value(name: &str, value: &str, max_age: u64, secure: bool) -> Option<HeaderValue> {
    match HeaderValue::from_str(&format!("{name}={value}; Max-Age={max_age}; {}", attrs(secure))) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(target: "auth", cookie = name, "token is not a valid cookie value: {e}");
            None
        }
    }
}

/// Append `Set-Cookie` headers for a freshly issued or rotated pair.
pub fn append_session_cookies(headers: &mut HeaderMap, issued: &IssuedSession, secure: bool) {
    let access = cookie_value(ACCESS_COOKIE, &issued.access_token, issued.expires_in.as_secs(), secure);
    let refresh = cookie_value(REFRESH_COOKIE, &issued.refresh_token, REFRESH_MAX_AGE_SECS, secure);
    for v in [access, refresh].into_iter().flatten() {
        headers.append(SET_COOKIE, v);
    }
}

/// Append `Set-Cookie` headers that expire both session cookies.
pub fn append_cleared_cookies(headers: &mut HeaderMap, secure: bool) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let s = format!("{name}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; {}", attrs(secure));
        if let Ok(v) = HeaderValue::from_str(&s) {
            headers.append(SET_COOKIE, v);
        }
    }
}
