//! Yieldscope - Metis DeFi yield aggregator
//!
//! Reads JSON-lines queries on stdin and answers on stdout. Logs go to
//! stderr so the protocol channel stays clean.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yieldscope::aggregator::YieldAggregator;
use yieldscope::config::{AppConfig, LoggingConfig};
use yieldscope::server;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    init_logging(&config.logging);

    info!(config = %config, "Starting yieldscope v{}", env!("CARGO_PKG_VERSION"));

    let aggregator = Arc::new(YieldAggregator::from_config(&config)?);
    if aggregator.source_names().is_empty() {
        warn!("No yield sources configured; every query will return an empty set");
    }

    let refresh_task = config
        .cache
        .refresh_interval()
        .map(|every| {
            info!(interval_secs = every.as_secs(), "Background refresh enabled");
            aggregator.clone().spawn_refresh_task(every)
        });

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    tokio::select! {
        result = server::serve(&aggregator, stdin, stdout) => {
            result.context("Query loop failed")?;
            info!("Input closed, shutting down");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    if let Some(task) = refresh_task {
        task.abort();
    }
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("yieldscope={}", logging.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
