// src/ingest/cache.rs
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::fsutil;

/// Cached HTTP validators for one feed URL, persisted between runs.
/// Absence of a record means "no cached validator": the next fetch for
/// that URL goes out unconditional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevalidationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// HTTP status of the last attempt; 0 is the sentinel for a transport
    /// failure (including timeout) where no response arrived.
    #[serde(default)]
    pub last_status: u16,
    #[serde(default)]
    pub last_checked_at: String,
}

pub type RevalidationCache = BTreeMap<String, RevalidationRecord>;

/// Read the whole cache. A missing file is an empty cache, never an error;
/// an unreadable or malformed file degrades the same way, since losing the
/// cache only costs one round of unconditional refetches.
pub fn load(path: &Path) -> RevalidationCache {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return RevalidationCache::new(),
    };
    match serde_json::from_str(&content) {
        Ok(map) => map,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "revalidation cache unreadable, starting empty");
            RevalidationCache::new()
        }
    }
}

/// Rewrite the whole cache, staged through a sibling `.tmp` so a crash
/// mid-write leaves the previous version intact. Called once per run,
/// after the fetch loop.
pub fn save(path: &Path, cache: &RevalidationCache) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let body = serde_json::to_vec_pretty(cache).context("serializing revalidation cache")?;
    fsutil::write_atomic(path, &body)
        .with_context(|| format!("writing revalidation cache {}", path.display()))
}
