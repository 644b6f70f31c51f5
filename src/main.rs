use std::net::SocketAddr;

use anyhow::Context;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;

use docflow::{config::AppConfig, routes::create_router, state::AppState, Sweeper};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "server",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        s3_bucket = ?config.s3_bucket,
        converter_url = %config.converter_url,
        processing_timeout_secs = config.processing_timeout.as_secs(),
        auto_process_uploads = config.auto_process_uploads,
        "loaded docflow configuration"
    );

    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid SERVER_HOST/SERVER_PORT")?;
    let stale_after = config.stale_processing_after;
    let sweep_interval = config.sweep_interval;

    let state = AppState::connect(config).await?;

    // Rows left in `processing` by a previous run have no task to finish them.
    let sweeper = Sweeper::new(state.orchestrator.clone(), stale_after, sweep_interval);
    if let Err(err) = sweeper.tick().await {
        tracing::error!(error = %err, "startup sweep of stale documents failed");
    }
    tokio::spawn(async move { sweeper.run().await });

    let app = create_router(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "docflow listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        tracing::info!("server received shutdown signal");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
