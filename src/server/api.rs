//! Admin JSON API: upload, list, read, update, delete and the rotation preview.
//! All routes here sit behind `gate::admin_api`.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, RawQuery, State};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::gate::AdminIdentity;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::meditation::{AudioUpload, ListQuery, MeditationPatch, SortOrder, UploadRequest, tag_universe};

pub const DEFAULT_SCHEDULE_DAYS: usize = 7;
pub const MAX_SCHEDULE_DAYS: usize = 366;

/// Path ids that are not UUIDs cannot name a row.
pub fn parse_id(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::not_found("not_found".to_string(), format!("Meditation {raw} not found")))
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s).map(|v| v.into_owned()).unwrap_or_else(|_| s.clone())
}

/// `q=<text>&tag=a&tag=b,c&sort=oldest`; unknown keys and bad sort values are ignored.
pub fn parse_list_query(raw: Option<&str>) -> ListQuery {
    let mut q = ListQuery::default();
    let Some(raw) = raw else { return q; };
    for pair in raw.split('&').filter(|p| !p.is_empty()) {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let v = decode_component(v);
        match decode_component(k).as_str() {
            "q" | "search" => q.search = v.trim().to_string(),
            "tag" | "tags" => {
                for t in v.split(',').map(str::trim).filter(|t| !t.is_empty()) {
                    q.tags.insert(t.to_string());
                }
            }
            "sort" => {
                if let Some(s) = SortOrder::parse(&v) { q.sort = s; }
            }
            _ => {}
        }
    }
    q
}

pub async fn list_meditations(State(state): State<AppState>, RawQuery(raw): RawQuery) -> AppResult<Json<Value>> {
    let query = parse_list_query(raw.as_deref());
    let all = state.repo.list(false).await?;
    let tags = tag_universe(&all);
    let matched = query.apply(&all);
    debug!(target: "api", total = all.len(), matched = matched.len(), "list meditations");
    Ok(Json(json!({
        "meditations": matched,
        "total": all.len(),
        "matched": matched.len(),
        "tags": tags,
        "query": {
            "q": query.search,
            "tags": query.tags,
            "sort": query.sort,
        },
    })))
}

pub async fn get_meditation(State(state): State<AppState>, Path(id): Path<String>) -> AppResult<Json<Value>> {
    let id = parse_id(&id)?;
    let view = state.repo.get(id).await?;
    Ok(Json(json!(view)))
}

/// Partial update. The body is decoded here so malformed JSON maps to our 400.
pub async fn update_meditation(
    State(state): State<AppState>,
    AdminIdentity(who): AdminIdentity,
    Path(id): Path<String>,
    body: Bytes,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id)?;
    let patch: MeditationPatch = if body.iter().all(u8::is_ascii_whitespace) {
        MeditationPatch::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::user("invalid_body".to_string(), format!("Invalid request body: {e}")))?
    };
    let changes = patch.into_changes()?;
    let updated = state.repo.update(id, &changes).await?;
    info!(target: "api", %id, user = %who.user_id, "meditation updated");
    Ok(Json(json!(updated)))
}

pub async fn delete_meditation(
    State(state): State<AppState>,
    AdminIdentity(who): AdminIdentity,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    let id = parse_id(&id)?;
    state.repo.delete(id).await?;
    info!(target: "api", %id, user = %who.user_id, "meditation deleted");
    Ok(Json(json!({ "ok": true })))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    warn!(target: "api", "multipart read failed: {e}");
    AppError::user("invalid_multipart".to_string(), e.body_text())
}

/// Read the upload form. Unknown parts are skipped.
async fn read_upload_form(mut multipart: Multipart) -> AppResult<UploadRequest> {
    let mut req = UploadRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().map(str::to_string).filter(|n| !n.is_empty());
                let content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                // An empty file input still posts a part.
                if file_name.is_none() && bytes.is_empty() { continue; }
                req.file = Some(AudioUpload { file_name, content_type, bytes: bytes.to_vec() });
            }
            "title" => req.title = Some(field.text().await.map_err(multipart_error)?),
            "quote" => req.quote = Some(field.text().await.map_err(multipart_error)?),
            "tags" => req.tags = Some(field.text().await.map_err(multipart_error)?),
            other => debug!(target: "api", field = other, "ignoring upload field"),
        }
    }
    Ok(req)
}

pub async fn upload(
    State(state): State<AppState>,
    AdminIdentity(who): AdminIdentity,
    multipart: Multipart,
) -> AppResult<Json<Value>> {
    let validated = read_upload_form(multipart).await?.validate()?;
    let created = state.repo.create(validated, Utc::now().timestamp_millis()).await?;
    info!(target: "api", id = %created.id, user = %who.user_id, "upload stored");
    Ok(Json(json!({ "ok": true, "id": created.id })))
}

pub fn parse_days(raw: Option<&str>) -> AppResult<usize> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else { return Ok(DEFAULT_SCHEDULE_DAYS); };
    match raw.parse::<usize>() {
        Ok(n) if (1..=MAX_SCHEDULE_DAYS).contains(&n) => Ok(n),
        _ => Err(AppError::user(
            "invalid_days".to_string(),
            format!("days must be between 1 and {MAX_SCHEDULE_DAYS}"),
        )),
    }
}

pub async fn schedule(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> AppResult<Json<Value>> {
    let days = parse_days(params.get("days").map(String::as_str))?;
    let entries = state.repo.schedule(Utc::now(), days).await?;
    Ok(Json(json!({ "days": days, "schedule": entries })))
}
