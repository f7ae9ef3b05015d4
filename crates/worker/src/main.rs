//! `query-worker [CONFIG.json]`
//!
//! Reads request terms from stdin and writes response terms to stdout.
//! Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use worker::{serve, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = WorkerConfig::load(config_path.as_deref())?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(config.log_level()?)
        .init();

    tracing::info!(
        encoding = %config.encoding,
        max_concurrency = config.max_concurrency,
        "Starting query worker"
    );

    let dispatcher = Arc::new(config.build_dispatcher()?);
    let stats = serve(
        tokio::io::stdin(),
        tokio::io::stdout(),
        dispatcher,
        config.max_concurrency,
    )
    .await?;

    tracing::info!("Worker stopped: {:?}", stats);

    Ok(())
}
