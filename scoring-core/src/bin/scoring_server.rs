//! Scoring engine host binary

use anyhow::Context;
use scoring_core::{Config, ScoringEngine};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional config file as the first argument, environment otherwise
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => Config::from_env().context("reading SCORING_* environment")?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));
    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        data_dir = ?config.data_dir,
        "Starting scoring server"
    );

    let engine = ScoringEngine::open(config)
        .await
        .context("opening scoring engine")?;
    let stats = engine.stats()?;
    tracing::info!(
        matches = stats.total_matches,
        entries = stats.total_entries,
        "Scoring engine ready"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down scoring server");
    engine.shutdown().await?;
    Ok(())
}
