//! Hosted auth backend (Supabase GoTrue) over HTTP.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use super::principal::Identity;
use super::provider::{AuthProvider, ResolvedSession};
use super::session::{IssuedSession, SessionTokens};
use crate::storage::supabase::upstream_message;

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

impl From<GoTrueUser> for Identity {
    fn from(u: GoTrueUser) -> Self { Identity::new(u.id, u.email) }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    user: GoTrueUser,
}

impl TokenResponse {
    fn split(self) -> (Identity, IssuedSession) {
        let issued = IssuedSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_in: Duration::from_secs(self.expires_in.unwrap_or(3600)),
        };
        (self.user.into(), issued)
    }
}

pub struct GoTrueAuthProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl GoTrueAuthProvider {
    pub fn new(http: reqwest::Client, base_url: &str, anon_key: &str) -> Self {
        Self { http, base_url: base_url.trim_end_matches('/').to_string(), anon_key: anon_key.to_string() }
    }

    fn url(&self, path: &str) -> String { format!("{}/auth/v1/{}", self.base_url, path) }

    /// `Ok(None)` when the access token is no longer accepted.
    async fn current_user(&self, access_token: &str) -> Result<Option<Identity>> {
        let resp = self
            .http
            .get(self.url("user"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(Some(resp.json::<GoTrueUser>().await?.into())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(None),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(anyhow!(upstream_message(s.as_u16(), &body)))
            }
        }
    }

    /// `Ok(None)` when the grant is rejected (bad credentials, spent refresh token).
    async fn token_grant(&self, grant: &str, body: serde_json::Value) -> Result<Option<TokenResponse>> {
        let resp = self
            .http
            .post(format!("{}?grant_type={}", self.url("token"), grant))
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(Some(resp.json::<TokenResponse>().await?));
        }
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            debug!(target: "auth", grant, status = status.as_u16(), "token grant rejected");
            return Ok(None);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(anyhow!(upstream_message(status.as_u16(), &text)))
    }
}

#[async_trait]
impl AuthProvider for GoTrueAuthProvider {
    async fn resolve(&self, tokens: &SessionTokens) -> Result<ResolvedSession> {
        if let Some(access) = tokens.access_token.as_deref() {
            if let Some(identity) = self.current_user(access).await? {
                return Ok(ResolvedSession { identity: Some(identity), rotated: None });
            }
        }
        if let Some(refresh) = tokens.refresh_token.as_deref() {
            let body = serde_json::json!({ "refresh_token": refresh });
            if let Some(tr) = self.token_grant("refresh_token", body).await? {
                let (identity, issued) = tr.split();
                return Ok(ResolvedSession { identity: Some(identity), rotated: Some(issued) });
            }
        }
        Ok(ResolvedSession::default())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Option<(Identity, IssuedSession)>> {
        let body = serde_json::json!({ "email": email.trim(), "password": password });
        Ok(self.token_grant("password", body).await?.map(TokenResponse::split))
    }

    async fn sign_out(&self, access_token: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("logout"))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!(upstream_message(status.as_u16(), &body)))
    }
}
