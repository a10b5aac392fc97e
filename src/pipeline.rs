// src/pipeline.rs
use std::fs;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::archive::{index, latest, prune, store};
use crate::config::{self, ArchiveConfig};
use crate::ingest::fetch::{Fetcher, HttpTransport};
use crate::ingest::types::FeedItem;
use crate::ingest::{self, cache};
use crate::metrics;

/// What one run did, for the closing log line and for tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub sources: usize,
    pub collected: usize,
    pub added: usize,
    pub pruned: usize,
    pub window_len: usize,
}

/// The post-collection half of a run: archival, retention, derived
/// artifacts. Split out so tests can drive it with synthetic items.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub added: usize,
    pub pruned: usize,
    pub window_len: usize,
}

/// Archive a batch of already-collected items: upsert month partitions
/// (guarded by the current latest window), prune retention, publish the
/// index, rebuild the window. Any failure here is a real persistence error
/// and aborts the run; continuing would leave derived state pointing at
/// partitions that were never written.
pub fn archive_pass(
    cfg: &ArchiveConfig,
    items: Vec<FeedItem>,
    now: DateTime<Utc>,
) -> Result<ArchiveOutcome> {
    let archive_dir = cfg.archive_dir();

    let latest_links = latest::read_latest_links(&cfg.latest_path());
    let added = store::upsert(&archive_dir, cfg.tz, items, &latest_links)?;
    let pruned = prune::prune(&archive_dir, cfg.tz, cfg.keep_years, now)?.len();
    index::publish(
        &archive_dir,
        &cfg.index_path(),
        cfg.tz,
        cfg.keep_years,
        cfg.latest_months,
        now,
    )?;
    let window_len = latest::rebuild(
        &archive_dir,
        &cfg.latest_path(),
        cfg.tz,
        cfg.latest_months,
        now,
    )?;

    Ok(ArchiveOutcome {
        added,
        pruned,
        window_len,
    })
}

/// One complete collector pass, run to completion:
/// sources → conditional fetch → normalize → batch dedup → archive →
/// prune → index → latest window → metrics. A broken source registry is
/// fatal before any network activity; a broken source is logged and the
/// run continues.
pub async fn run(cfg: &ArchiveConfig) -> Result<RunSummary> {
    fs::create_dir_all(cfg.archive_dir())
        .with_context(|| format!("creating {}", cfg.archive_dir().display()))?;
    fs::create_dir_all(cfg.data_dir())
        .with_context(|| format!("creating {}", cfg.data_dir().display()))?;

    let sources: Vec<_> = config::load_sources(cfg)?
        .into_iter()
        .filter(|s| s.participating())
        .collect();
    info!(sources = sources.len(), "run starting");

    let cache_path = cfg.cache_path();
    let mut revalidation = cache::load(&cache_path);

    let fetcher = Fetcher::new(HttpTransport::new(cfg.timeout())?);
    let (raw_items, source_metrics) = ingest::collect_once(&fetcher, &sources, &mut revalidation).await;
    cache::save(&cache_path, &revalidation)?;

    let items: Vec<FeedItem> = ingest::dedupe_by_link(raw_items).into_values().collect();
    info!(collected = items.len(), "unique items collected");

    let now = Utc::now();
    let collected = items.len();
    let outcome = archive_pass(cfg, items, now)?;
    metrics::write_report(cfg, source_metrics, now)?;

    Ok(RunSummary {
        sources: sources.len(),
        collected,
        added: outcome.added,
        pruned: outcome.pruned,
        window_len: outcome.window_len,
    })
}
