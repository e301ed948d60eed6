//! Shared harness: an in-process server on an ephemeral port over memory backends.
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::redirect::Policy;
use tokio::net::TcpListener;

use meditations::config::AppConfig;
use meditations::server::bootstrap::MemoryBackends;
use meditations::server::{AppState, serve};
use meditations::storage::Backends;

pub const ADMIN: &str = "mama@example.com";
pub const OUTSIDER: &str = "kid@example.com";
pub const PASSWORD: &str = "correct horse battery staple";

pub struct TestServer {
    pub base: String,
    pub mem: MemoryBackends,
    pub http: reqwest::Client,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String { format!("{}{}", self.base, path) }

    /// Sign in and return a `Cookie` header value carrying both session cookies.
    pub async fn login(&self, email: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.url("/api/admin/login"))
            .json(&serde_json::json!({ "email": email, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(resp.status() == 200, "login failed with {}", resp.status());
        Ok(cookie_header(&resp))
    }
}

/// Fold every `Set-Cookie` on a response into one `Cookie` header value.
/// Cookies being cleared (value `deleted`, epoch expiry) are left out; a live
/// token with a zero `Max-Age` is kept.
pub fn cookie_header(resp: &reqwest::Response) -> String {
    set_cookies(resp)
        .iter()
        .filter(|c| !is_cleared(c))
        .filter_map(|c| c.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn is_cleared(set_cookie: &str) -> bool {
    set_cookie.contains("=deleted;") || set_cookie.contains("Expires=Thu, 01 Jan 1970")
}

pub fn set_cookies(resp: &reqwest::Response) -> Vec<String> {
    resp.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

pub fn with_cookie(rb: reqwest::RequestBuilder, cookie: &str) -> reqwest::RequestBuilder {
    rb.header(COOKIE, cookie)
}

pub async fn spawn() -> TestServer {
    spawn_with_session_ttl(Duration::from_secs(3600)).await
}

pub async fn spawn_with_session_ttl(session_ttl: Duration) -> TestServer {
    spawn_with_backends(session_ttl, |b| b).await
}

/// Like `spawn`, letting the caller swap individual backend handles.
pub async fn spawn_with_backends<F>(session_ttl: Duration, customize: F) -> TestServer
where
    F: FnOnce(Backends) -> Backends,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let config = AppConfig { public_url: base.clone(), session_ttl, ..AppConfig::default() };

    let mem = MemoryBackends::new(&base, session_ttl);
    mem.allowlist.add(ADMIN);
    mem.auth.register(ADMIN, PASSWORD).unwrap();
    mem.auth.register(OUTSIDER, PASSWORD).unwrap();

    let state = AppState::new(customize(mem.backends()), config);
    tokio::spawn(async move {
        let _ = serve(listener, state).await;
    });

    let http = reqwest::Client::builder().redirect(Policy::none()).build().unwrap();
    TestServer { base, mem, http }
}

pub fn audio_form(title: &str, mime: &str, bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes).file_name("take.mp3").mime_str(mime).unwrap();
    reqwest::multipart::Form::new()
        .text("title", title.to_string())
        .text("quote", "Breathe in.")
        .text("tags", "calm, morning")
        .part("file", part)
}
