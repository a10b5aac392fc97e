// src/metrics.rs
use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::month::civil_stamp;
use crate::config::{ArchiveConfig, SourceSpec};
use crate::fsutil;

/// Per-source fetch observability: one record per configured source per
/// run. Write-only; nothing in the pipeline reads these back.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetric {
    pub name: String,
    pub url: String,
    pub category: String,
    /// HTTP status of the attempt; 0 when the transport failed outright.
    pub status: u16,
    /// Time spent on the network call only, parse time excluded.
    pub elapsed_ms: u64,
    pub bytes: u64,
    pub items: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SourceMetric {
    pub fn for_source(src: &SourceSpec, status: u16, elapsed: Duration) -> Self {
        Self {
            name: src.name.clone(),
            url: src.url.clone(),
            category: src.category.clone(),
            status,
            elapsed_ms: elapsed.as_millis() as u64,
            bytes: 0,
            items: 0,
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub generated_at: String,
    pub timeout_secs: u64,
    pub sources: Vec<SourceMetric>,
}

/// Overwrite `metrics.json` with this run's per-source records.
pub fn write_report(
    cfg: &ArchiveConfig,
    sources: Vec<SourceMetric>,
    now: DateTime<Utc>,
) -> Result<()> {
    let report = MetricsReport {
        generated_at: civil_stamp(now, cfg.tz),
        timeout_secs: cfg.timeout_secs,
        sources,
    };
    let path = cfg.metrics_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(&report).context("serializing metrics report")?;
    fsutil::write_atomic(&path, &body).with_context(|| format!("writing {}", path.display()))
}
