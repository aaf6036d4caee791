//! blog-announcer binary entrypoint.
//! Boots the Axum HTTP server that receives microCMS webhooks and announces new articles.
//!
//! Usage: `blog-announcer [PORT]` (the port argument overrides `PORT` and the config file).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use blog_announcer::config::AppConfig;
use blog_announcer::metrics::Metrics;
use blog_announcer::{api, bootstrap, shutdown, telemetry};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();

    let mut cfg = AppConfig::load()?;
    if let Some(port) = std::env::args().nth(1) {
        cfg.port = port
            .parse()
            .with_context(|| format!("invalid port argument {port:?}"))?;
    }

    telemetry::init(cfg.log_format)?;

    let metrics = Metrics::init()?;

    let state = bootstrap::build_state(&cfg)?;
    let shutdown = shutdown::install_shutdown_handler();
    let sweeper = state
        .executor
        .spawn_sweeper(cfg.sweep_interval(), shutdown.clone());

    let mut app = api::router(state);
    if cfg.debug_routes {
        app = app.merge(metrics.router());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(
        %addr,
        deploy_wait_secs = cfg.deploy_wait_secs,
        cooldown_secs = cfg.cooldown_secs,
        "starting server"
    );

    let token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("http server")?;

    shutdown.cancel();
    let _ = sweeper.await;
    info!("server stopped; pending jobs abandoned");
    Ok(())
}
