use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod http;
mod service;

use config::Config;
use service::{AffectService, ServiceSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("affectd starting");

    let config = Config::load().context("loading configuration")?;
    tracing::info!(
        bind = %config.bind_addr,
        match_threshold = config.match_threshold,
        descriptor_dim = config.descriptor_dim,
        sharpen = config.sharpen_expressions,
        "configuration loaded"
    );

    // Store lifetime is the process lifetime; nothing is persisted.
    let service = AffectService::new(ServiceSettings::from(&config));
    let app = http::router(service, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "affectd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("affectd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
