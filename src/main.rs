//! Feed Archiver binary entrypoint.
//! One run-to-completion collector pass over the configured sources; an
//! external scheduler (cron, CI) invokes this once per cycle.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_archiver::{pipeline, ArchiveConfig};

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("feed_archiver=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = ArchiveConfig::from_env()?;
    let summary = pipeline::run(&cfg).await?;

    tracing::info!(
        sources = summary.sources,
        collected = summary.collected,
        added = summary.added,
        pruned = summary.pruned,
        window = summary.window_len,
        "collector run finished"
    );
    Ok(())
}
