//!
//! meditations configuration
//! -------------------------
//! Process configuration read once at startup from environment variables,
//! with a few CLI overrides. Parsing goes through a lookup function so tests
//! can supply their own variables without touching the process environment.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};

pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_BUCKET: &str = "meditations";
pub const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3600;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    Supabase,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" | "local" => Some(BackendKind::Memory),
            "supabase" => Some(BackendKind::Supabase),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
    pub service_role_key: String,
}

// Keys stay out of logs.
impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig").field("url", &self.url).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind: String,
    pub http_port: u16,
    pub public_url: String,
    pub backend: BackendKind,
    pub supabase: Option<SupabaseConfig>,
    pub bucket: String,
    /// Comma-separated `ALLOWED_ADMIN_EMAILS`, split and trimmed.
    pub allowed_admin_emails: Vec<String>,
    pub admin_password: Option<String>,
    pub signed_url_ttl: Duration,
    pub session_ttl: Duration,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            http_port: DEFAULT_HTTP_PORT,
            public_url: format!("http://localhost:{DEFAULT_HTTP_PORT}"),
            backend: BackendKind::Memory,
            supabase: None,
            bucket: DEFAULT_BUCKET.to_string(),
            allowed_admin_emails: Vec::new(),
            admin_password: None,
            signed_url_ttl: Duration::from_secs(DEFAULT_SIGNED_URL_TTL_SECS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut cfg = AppConfig::default();

        if let Some(p) = get("MEDITATIONS_HTTP_PORT") {
            cfg.http_port = p.parse::<u16>().with_context(|| format!("MEDITATIONS_HTTP_PORT is not a port: {p}"))?;
        }
        if let Some(b) = get("MEDITATIONS_BIND") { cfg.bind = b; }
        cfg.public_url = match get("MEDITATIONS_PUBLIC_URL") {
            Some(u) => u.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", cfg.http_port),
        };
        if let Some(b) = get("MEDITATIONS_BACKEND") {
            cfg.backend = BackendKind::parse(&b).with_context(|| format!("unknown MEDITATIONS_BACKEND: {b}"))?;
        }
        if let Some(b) = get("MEDITATIONS_BUCKET") { cfg.bucket = b; }
        cfg.allowed_admin_emails = get("ALLOWED_ADMIN_EMAILS").map(|s| split_list(&s)).unwrap_or_default();
        cfg.admin_password = get("MEDITATIONS_ADMIN_PASSWORD");
        if let Some(s) = parse_u64(&get, "MEDITATIONS_SIGNED_URL_TTL_SECS")? { cfg.signed_url_ttl = Duration::from_secs(s); }
        if let Some(s) = parse_u64(&get, "MEDITATIONS_SESSION_TTL_SECS")? { cfg.session_ttl = Duration::from_secs(s); }
        if let Some(mb) = parse_u64(&get, "MEDITATIONS_MAX_UPLOAD_MB")? {
            let Some(bytes) = usize::try_from(mb).ok().and_then(|mb| mb.checked_mul(1024 * 1024)) else {
                bail!("MEDITATIONS_MAX_UPLOAD_MB is too large: {mb}");
            };
            cfg.max_upload_bytes = bytes;
        }

        if cfg.backend == BackendKind::Supabase {
            let url = get("SUPABASE_URL").context("SUPABASE_URL is required for the supabase backend")?;
            let anon_key = get("SUPABASE_ANON_KEY").context("SUPABASE_ANON_KEY is required for the supabase backend")?;
            let service_role_key = get("SUPABASE_SERVICE_ROLE_KEY")
                .context("SUPABASE_SERVICE_ROLE_KEY is required for the supabase backend")?;
            cfg.supabase = Some(SupabaseConfig { url: url.trim_end_matches('/').to_string(), anon_key, service_role_key });
        }
        if cfg.signed_url_ttl.is_zero() { bail!("MEDITATIONS_SIGNED_URL_TTL_SECS must be positive"); }
        if cfg.session_ttl.is_zero() { bail!("MEDITATIONS_SESSION_TTL_SECS must be positive"); }
        Ok(cfg)
    }

    /// Apply command-line overrides (`--port N`, `--bind ADDR`).
    pub fn apply_args(&mut self, args: &[String]) {
        if let Some(p) = parse_port_arg(args, "--port") {
            let default_public = format!("http://localhost:{}", self.http_port);
            if self.public_url == default_public {
                self.public_url = format!("http://localhost:{p}");
            }
            self.http_port = p;
        }
        if let Some(b) = parse_str_arg(args, "--bind") { self.bind = b; }
    }

    pub fn listen_addr(&self) -> String { format!("{}:{}", self.bind, self.http_port) }
}

fn parse_u64<F>(get: &F, name: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(v) => Ok(Some(v.parse::<u64>().with_context(|| format!("{name} is not a number: {v}"))?)),
        None => Ok(None),
    }
}

pub fn split_list(s: &str) -> Vec<String> {
    s.split(',').map(|e| e.trim().to_string()).filter(|e| !e.is_empty()).collect()
}

pub fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    parse_str_arg(args, flag).and_then(|v| v.parse::<u16>().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    args.get(i + 1).cloned()
}

pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let m: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k| m.get(k).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.listen_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.max_upload_bytes, 50 * 1024 * 1024);
    }

    #[test]
    fn reads_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("MEDITATIONS_HTTP_PORT", "9000"),
            ("ALLOWED_ADMIN_EMAILS", " mama@example.com, ,Dad@Example.com "),
            ("MEDITATIONS_SIGNED_URL_TTL_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(cfg.http_port, 9000);
        assert_eq!(cfg.public_url, "http://localhost:9000");
        assert_eq!(cfg.allowed_admin_emails, vec!["mama@example.com", "Dad@Example.com"]);
        assert_eq!(cfg.signed_url_ttl, Duration::from_secs(60));
    }

    #[test]
    fn supabase_requires_credentials() {
        let err = AppConfig::from_lookup(lookup(&[("MEDITATIONS_BACKEND", "supabase")])).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));
        let cfg = AppConfig::from_lookup(lookup(&[
            ("MEDITATIONS_BACKEND", "supabase"),
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("SUPABASE_SERVICE_ROLE_KEY", "service"),
        ]))
        .unwrap();
        assert_eq!(cfg.supabase.as_ref().unwrap().url, "https://x.supabase.co");
        assert!(!format!("{:?}", cfg.supabase).contains("service"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(AppConfig::from_lookup(lookup(&[("MEDITATIONS_HTTP_PORT", "http")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MEDITATIONS_BACKEND", "sqlite")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("MEDITATIONS_SESSION_TTL_SECS", "0")])).is_err());
    }

    #[test]
    fn upload_limit_in_megabytes_must_fit() {
        let cfg = AppConfig::from_lookup(lookup(&[("MEDITATIONS_MAX_UPLOAD_MB", "2")])).unwrap();
        assert_eq!(cfg.max_upload_bytes, 2 * 1024 * 1024);
        let err = AppConfig::from_lookup(lookup(&[("MEDITATIONS_MAX_UPLOAD_MB", "18446744073709551615")])).unwrap_err();
        assert!(err.to_string().contains("MEDITATIONS_MAX_UPLOAD_MB"));
    }

    #[test]
    fn port_flag_overrides_env() {
        let mut cfg = AppConfig::default();
        cfg.apply_args(&["meditations".into(), "--port".into(), "3000".into()]);
        assert_eq!(cfg.http_port, 3000);
        assert_eq!(cfg.public_url, "http://localhost:3000");
        cfg.apply_args(&["--port".into(), "nope".into()]);
        assert_eq!(cfg.http_port, 3000);
    }
}
