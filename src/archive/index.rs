// src/archive/index.rs
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

use crate::archive::month::{civil_stamp, MonthKey};
use crate::archive::store;
use crate::fsutil;

pub const ARCHIVE_PATH_TEMPLATE: &str = "archive/{YYYY}/{YYYY-MM}.ndjson.gz";

/// Consumer-facing summary of what the archive currently holds. Derived
/// entirely from the partition files on disk each run; holds no state of
/// its own and is safe to regenerate any number of times.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveIndex {
    pub generated_at: String,
    pub keep_years: i32,
    pub latest_months: u32,
    pub min_month: Option<String>,
    pub max_month: Option<String>,
    pub months: Vec<String>,
    pub archive_path_template: String,
}

pub fn publish(
    archive_dir: &Path,
    index_path: &Path,
    tz: FixedOffset,
    keep_years: i32,
    latest_months: u32,
    now: DateTime<Utc>,
) -> Result<ArchiveIndex> {
    let months: Vec<String> = store::list_months(archive_dir)?
        .iter()
        .map(MonthKey::to_string)
        .collect();

    let index = ArchiveIndex {
        generated_at: civil_stamp(now, tz),
        keep_years,
        latest_months,
        min_month: months.first().cloned(),
        max_month: months.last().cloned(),
        months,
        archive_path_template: ARCHIVE_PATH_TEMPLATE.to_string(),
    };

    if let Some(parent) = index_path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(&index).context("serializing archive index")?;
    fsutil::write_atomic(index_path, &body)
        .with_context(|| format!("writing {}", index_path.display()))?;

    Ok(index)
}
