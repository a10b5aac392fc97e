// src/archive/store.rs
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::FixedOffset;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::archive::month::MonthKey;
use crate::fsutil;
use crate::ingest::types::FeedItem;

pub const PARTITION_SUFFIX: &str = ".ndjson.gz";

/// `archive/{YYYY}/{YYYY-MM}.ndjson.gz`
pub fn partition_path(archive_dir: &Path, key: MonthKey) -> PathBuf {
    archive_dir
        .join(format!("{:04}", key.year))
        .join(format!("{key}{PARTITION_SUFFIX}"))
}

/// Read one partition. A missing file is an empty partition; a line that
/// does not decode is skipped, not an error.
pub fn read_partition(path: &Path) -> Result<Vec<FeedItem>> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
    };

    let reader = BufReader::new(GzDecoder::new(file));
    let mut items = Vec::new();
    for line in reader.lines() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<FeedItem>(line) {
            Ok(item) => items.push(item),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping undecodable archive line");
            }
        }
    }
    Ok(items)
}

/// Write a partition as gzip NDJSON, staged through `.tmp` + rename so an
/// interrupted run leaves the previous file fully intact.
pub fn write_partition(path: &Path, items: &[FeedItem]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    for item in items {
        serde_json::to_writer(&mut enc, item).context("encoding archive line")?;
        enc.write_all(b"\n").context("encoding archive line")?;
    }
    let bytes = enc.finish().context("compressing partition")?;
    fsutil::write_atomic(path, &bytes)
}

/// Merge new items into their month partitions and report how many were
/// newly persisted. Per affected month: links already present in the
/// partition or in the latest window are rejected; admitted links join the
/// rejection set immediately, collapsing same-month duplicates inside the
/// batch first-seen-wins. A month with zero admissions is left untouched:
/// no rewrite, no timestamp churn. A partition never loses items and never
/// gains a duplicate link.
///
/// The latest-window guard is what stops a feed re-publishing an old-dated
/// item from reappearing as "new" once its true month has rolled out of
/// window coverage.
pub fn upsert(
    archive_dir: &Path,
    tz: FixedOffset,
    items: Vec<FeedItem>,
    latest_links: &HashSet<String>,
) -> Result<usize> {
    let mut by_month: BTreeMap<MonthKey, Vec<FeedItem>> = BTreeMap::new();
    for item in items {
        by_month
            .entry(MonthKey::from_instant(item.pub_date, tz))
            .or_default()
            .push(item);
    }

    let mut added_total = 0usize;

    for (key, candidates) in by_month {
        let path = partition_path(archive_dir, key);
        let existing = read_partition(&path)?;

        let mut seen: HashSet<String> = existing.iter().map(|it| it.link.clone()).collect();
        seen.extend(latest_links.iter().cloned());

        let mut admitted: Vec<FeedItem> = Vec::new();
        for item in candidates {
            if seen.insert(item.link.clone()) {
                admitted.push(item);
            }
        }

        if admitted.is_empty() {
            continue;
        }

        let added = admitted.len();
        let mut merged = existing;
        merged.append(&mut admitted);
        // Newest first on disk; readability, not a correctness invariant.
        merged.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));

        write_partition(&path, &merged).with_context(|| format!("updating partition {key}"))?;
        info!(month = %key, added, total = merged.len(), "partition updated");
        added_total += added;
    }

    Ok(added_total)
}

/// Months that have a partition file on disk, ascending. Stray files,
/// `.tmp` leftovers from an interrupted run included, are ignored.
pub fn list_months(archive_dir: &Path) -> Result<Vec<MonthKey>> {
    let entries = match fs::read_dir(archive_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", archive_dir.display())),
    };

    let mut months = BTreeSet::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", archive_dir.display()))?;
        let path = entry.path();
        if !path.is_dir() || !is_year_dir_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        for file in fs::read_dir(&path).with_context(|| format!("listing {}", path.display()))? {
            let file = file.with_context(|| format!("listing {}", path.display()))?;
            let name = file.file_name();
            let name = name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(PARTITION_SUFFIX) {
                if let Ok(key) = stem.parse::<MonthKey>() {
                    months.insert(key);
                }
            }
        }
    }
    Ok(months.into_iter().collect())
}

pub(crate) fn is_year_dir_name(name: &str) -> bool {
    name.len() == 4 && name.bytes().all(|b| b.is_ascii_digit())
}
