use std::env;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use docflow::{config::AppConfig, state::AppState, Sweeper};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut args = env::args().skip(1);
    match args.next().as_deref() {
        Some("sweep-stale") => sweep_stale().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\nUsage: maintenance sweep-stale");
            std::process::exit(1);
        }
        None => {
            eprintln!("Usage: maintenance sweep-stale");
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn sweep_stale() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        stale_after_secs = config.stale_processing_after.as_secs(),
        "loaded docflow configuration"
    );
    if config.database_url.is_none() {
        println!("DATABASE_URL not set; nothing to sweep.");
        return Ok(());
    }

    let stale_after = config.stale_processing_after;
    let sweep_interval = config.sweep_interval;
    let state = AppState::connect(config).await?;
    let sweeper = Sweeper::new(state.orchestrator.clone(), stale_after, sweep_interval);

    let swept = sweeper.tick().await?;
    println!("Marked {swept} stale document(s) as failed.");
    Ok(())
}
