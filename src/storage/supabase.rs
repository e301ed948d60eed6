//! Hosted backend: PostgREST tables and Supabase Storage over HTTP.
//!
//! The client is built once with the service key and shared by every request;
//! authorization has already been decided by the session gate before any call
//! lands here. Error bodies are decoded best-effort so the upstream message
//! reaches the caller verbatim.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, RequestBuilder, Response};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use super::{AllowlistStore, MeditationStore, ObjectStore, StoreError, StoreResult};
use crate::meditation::{Meditation, MeditationChanges, NewMeditation};

const MEDITATIONS_TABLE: &str = "meditations";
const ALLOWLIST_TABLE: &str = "admin_allowlist";

#[derive(Clone)]
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str, bucket: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        }
    }

    fn rest_url(&self, table: &str) -> String { format!("{}/rest/v1/{}", self.base_url, table) }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path.trim_start_matches('/'))
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        rb.header("apikey", &self.api_key).bearer_auth(&self.api_key)
    }

    async fn rows(&self, rb: RequestBuilder) -> StoreResult<Vec<Meditation>> {
        let resp = checked(self.authed(rb).send().await?).await?;
        Ok(resp.json::<Vec<Meditation>>().await?)
    }
}

/// Pass successful responses through; turn error responses into `StoreError::Upstream`.
async fn checked(resp: Response) -> StoreResult<Response> {
    let status = resp.status();
    if status.is_success() { return Ok(resp); }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Upstream(upstream_message(status.as_u16(), &body)))
}

/// Extract the human message from a PostgREST / Storage / GoTrue error body.
pub(crate) fn upstream_message(status: u16, body: &str) -> String {
    #[derive(Deserialize, Default)]
    struct ErrorBody {
        message: Option<String>,
        msg: Option<String>,
        error_description: Option<String>,
        error: Option<String>,
    }
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.msg)
        .or(parsed.error_description)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("upstream returned HTTP {status}"))
}

/// Escape LIKE metacharacters so `ilike` performs a case-insensitive equality.
fn ilike_exact(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') { out.push('\\'); }
        out.push(c);
    }
    out
}

#[async_trait]
impl MeditationStore for SupabaseClient {
    async fn list(&self, published_only: bool) -> StoreResult<Vec<Meditation>> {
        let mut url = format!("{}?select=*&order=created_at.asc", self.rest_url(MEDITATIONS_TABLE));
        if published_only { url.push_str("&published=eq.true"); }
        self.rows(self.http.get(url)).await
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Meditation>> {
        let url = format!("{}?select=*&id=eq.{}&limit=1", self.rest_url(MEDITATIONS_TABLE), id);
        Ok(self.rows(self.http.get(url)).await?.into_iter().next())
    }

    async fn insert(&self, row: NewMeditation) -> StoreResult<Meditation> {
        let rb = self
            .http
            .post(self.rest_url(MEDITATIONS_TABLE))
            .header("Prefer", "return=representation")
            .json(&row);
        self.rows(rb)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Upstream("insert returned no row".into()))
    }

    async fn update(&self, id: Uuid, changes: &MeditationChanges) -> StoreResult<Option<Meditation>> {
        let url = format!("{}?id=eq.{}", self.rest_url(MEDITATIONS_TABLE), id);
        let rb = self.http.patch(url).header("Prefer", "return=representation").json(&changes.to_json());
        Ok(self.rows(rb).await?.into_iter().next())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let url = format!("{}?id=eq.{}", self.rest_url(MEDITATIONS_TABLE), id);
        let rb = self.http.delete(url).header("Prefer", "return=representation");
        Ok(!self.rows(rb).await?.is_empty())
    }
}

#[async_trait]
impl AllowlistStore for SupabaseClient {
    async fn contains(&self, email: &str) -> StoreResult<bool> {
        // '*' is a wildcard alias in PostgREST patterns and cannot be escaped.
        if email.is_empty() || email.contains('*') { return Ok(false); }
        let url = format!(
            "{}?select=email&email=ilike.{}&limit=1",
            self.rest_url(ALLOWLIST_TABLE),
            urlencoding::encode(&ilike_exact(email))
        );
        let resp = checked(self.authed(self.http.get(url)).send().await?).await?;
        let rows: Vec<serde_json::Value> = resp.json().await?;
        debug!(target: "allowlist", matched = rows.len(), "allowlist lookup");
        Ok(!rows.is_empty())
    }
}

#[derive(Deserialize)]
struct SignedUrlBody {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let rb = self
            .http
            .post(self.object_url(path))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        checked(self.authed(rb).send().await?).await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> StoreResult<()> {
        let url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let rb = self.http.delete(url).json(&serde_json::json!({ "prefixes": [path] }));
        checked(self.authed(rb).send().await?).await?;
        Ok(())
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String> {
        let url = format!(
            "{}/storage/v1/object/sign/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        );
        let rb = self.http.post(url).json(&serde_json::json!({ "expiresIn": ttl.as_secs() }));
        let resp = checked(self.authed(rb).send().await?).await?;
        let body: SignedUrlBody = resp.json().await?;
        Ok(format!("{}/storage/v1{}", self.base_url, body.signed_url))
    }
}
