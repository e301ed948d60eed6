//! Unauthenticated endpoints: today's meditation and local signed audio.

use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use super::AppState;
use crate::error::{AppError, AppResult};

pub async fn today(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let (day, meditation) = state.repo.today(Utc::now()).await?;
    Ok(Json(json!({ "day": day, "meditation": meditation })))
}

/// Bytes behind a signed token minted by the in-process bucket.
pub async fn signed_object(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    let object = state.backends.local_objects.as_ref().and_then(|o| o.fetch_signed(&token));
    let Some(object) = object else {
        return AppError::not_found("not_found", "Object not found or link expired").into_response();
    };
    let mut headers = HeaderMap::new();
    let content_type = HeaderValue::from_str(&object.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    headers.insert(CONTENT_TYPE, content_type);
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("private, max-age=0"));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", object.etag)) {
        headers.insert(ETAG, etag);
    }
    (StatusCode::OK, headers, object.bytes).into_response()
}
