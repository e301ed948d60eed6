//!
//! meditations HTTP server
//! -----------------------
//! Axum router for the public listening page, the admin pages and the admin
//! JSON API, plus startup wiring and graceful shutdown.
//!
//! Responsibilities:
//! - Build the backend handles once and inject them through `AppState`.
//! - Gate `/admin/*` pages and `/api/admin/*` calls on session + allowlist.
//! - Serve signed audio URLs when the in-process bucket is in use.
//! - Sweep expired signed grants and in-process sessions in the background.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::meditation::MeditationRepository;
use crate::storage::Backends;

pub mod api;
pub mod auth_routes;
pub mod bootstrap;
pub mod cookies;
pub mod gate;
pub mod pages;
pub mod public;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub backends: Backends,
    pub repo: MeditationRepository,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(backends: Backends, config: AppConfig) -> Self {
        let repo = MeditationRepository::from_backends(&backends, config.signed_url_ttl);
        Self { backends, repo, config: Arc::new(config) }
    }

    /// Cookies carry `Secure` when the site is served over https.
    pub fn secure_cookies(&self) -> bool { self.config.public_url.starts_with("https://") }
}

pub fn router(state: AppState) -> Router {
    let admin_api = Router::new()
        .route("/api/admin/meditations", get(api::list_meditations))
        .route(
            "/api/admin/meditations/{id}",
            get(api::get_meditation).patch(api::update_meditation).delete(api::delete_meditation),
        )
        .route(
            "/api/admin/upload",
            post(api::upload).layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .route("/api/admin/schedule", get(api::schedule))
        .route("/api/admin/session", get(auth_routes::session))
        .route_layer(from_fn_with_state(state.clone(), gate::admin_api));

    let admin_pages = Router::new()
        .route("/admin", get(pages::dashboard))
        .route("/admin/meditations", get(pages::meditations))
        .route("/admin/meditations/{id}", get(pages::meditation_detail))
        .route(gate::LOGIN_PATH, get(pages::login))
        .route(gate::NOT_AUTHORIZED_PATH, get(pages::not_authorized))
        .route_layer(from_fn_with_state(state.clone(), gate::admin_pages));

    Router::new()
        .route("/", get(pages::home))
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/today", get(public::today))
        .route("/storage/signed/{token}", get(public::signed_object))
        .route("/api/admin/check-email", post(auth_routes::check_email))
        .route("/api/admin/login", post(auth_routes::login))
        .route("/api/admin/logout", post(auth_routes::logout))
        .merge(admin_api)
        .merge(admin_pages)
        .with_state(state)
}

/// Periodically drop expired signed grants of the in-process bucket and
/// expired sessions of the in-process auth provider.
fn spawn_sweeper(backends: &Backends) {
    let objects = backends.local_objects.clone();
    let auth = backends.auth.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(SWEEP_INTERVAL).await;
            let grants = objects.as_ref().map(|o| o.sweep_expired()).unwrap_or(0);
            let sessions = auth.sweep_expired();
            if grants + sessions > 0 { debug!(grants = grants, sessions = sessions, "expired_sweep"); }
        }
    });
}

/// Serve on an already-bound listener until shutdown is signalled.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    spawn_sweeper(&state.backends);
    let app = router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let backends = bootstrap::build_backends(&config)?;
    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.listen_addr()))?;
    let listener = TcpListener::bind(addr).await.with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting server on {} (public url {})", addr, config.public_url);
    serve(listener, AppState::new(backends, config)).await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
