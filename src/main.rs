use anyhow::Context;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

use meditations::config::{AppConfig, has_flag};

const USAGE: &str = "meditations\n\nUSAGE:\n  meditations [--port N] [--bind ADDR]\n\nOPTIONS:\n  --port N       HTTP port (env: MEDITATIONS_HTTP_PORT, default 8080)\n  --bind ADDR    Listen address (env: MEDITATIONS_BIND, default 0.0.0.0)\n\nBackend selection and credentials come from MEDITATIONS_BACKEND and SUPABASE_* variables.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("building log filter")?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().collect();
    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print!("{USAGE}");
        return Ok(());
    }

    let mut config = AppConfig::from_env().context("reading configuration")?;
    config.apply_args(&args);

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "meditations",
        "Meditations starting: RUST_LOG='{}', listen={}, backend={:?}, bucket='{}', admins_in_env={}",
        rust_log,
        config.listen_addr(),
        config.backend,
        config.bucket,
        config.allowed_admin_emails.len()
    );

    meditations::server::run(config).await
}
