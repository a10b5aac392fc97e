// src/archive/latest.rs
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};

use crate::archive::month::MonthKey;
use crate::archive::store;
use crate::fsutil;
use crate::ingest;
use crate::ingest::types::FeedItem;

/// Links currently visible in the latest window, read before the window is
/// rebuilt. An item present here counts as already archived even if its
/// owning partition does not yet reflect it, which covers the race between
/// partition writes and window staleness.
///
/// Reads leniently: any JSON object with a `link` contributes, everything
/// else is skipped. A missing window file is an empty set.
pub fn read_latest_links(path: &Path) -> HashSet<String> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(_) => return HashSet::new(),
    };

    let mut links = HashSet::new();
    for line in BufReader::new(file).lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(v) => {
                if let Some(link) = v.get("link").and_then(|l| l.as_str()) {
                    links.insert(link.to_string());
                }
            }
            Err(e) => debug!(error = %e, "skipping undecodable latest line"),
        }
    }
    links
}

/// Rebuild the rolling window in full: the current month plus the
/// preceding `window_months - 1` months in the archive timezone, merged
/// from whatever partitions exist on disk, deduplicated by link keeping
/// the newest instant, newest first. Written uncompressed so a static
/// site can fetch it directly. Correctness never depends on the previous
/// window contents. Returns the number of items in the new window.
pub fn rebuild(
    archive_dir: &Path,
    latest_path: &Path,
    tz: FixedOffset,
    window_months: u32,
    now: DateTime<Utc>,
) -> Result<usize> {
    let want = MonthKey::from_instant(now, tz).window_ending_here(window_months);

    let mut items: Vec<FeedItem> = Vec::new();
    for key in store::list_months(archive_dir)? {
        if want.contains(&key) {
            items.extend(store::read_partition(&store::partition_path(archive_dir, key))?);
        }
    }

    // Same rule as the batch deduplicator: newest instant per link wins.
    let mut merged: Vec<FeedItem> = ingest::dedupe_by_link(items).into_values().collect();
    merged.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

    let mut body = Vec::new();
    for item in &merged {
        serde_json::to_writer(&mut body, item).context("encoding latest line")?;
        body.push(b'\n');
    }

    if let Some(parent) = latest_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    fsutil::write_atomic(latest_path, &body)
        .with_context(|| format!("writing {}", latest_path.display()))?;

    info!(items = merged.len(), months = want.len(), "latest window rebuilt");
    Ok(merged.len())
}
