// src/archive/prune.rs
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use tracing::info;

use crate::archive::month::MonthKey;
use crate::archive::store::{self, PARTITION_SUFFIX};

/// Delete every partition whose month starts before `keep_years` ago in
/// the archive timezone, then drop year directories left without any
/// partition. Retention is a hard bound: removed months are gone outright,
/// no archival, no soft-delete. Returns the months that were removed.
pub fn prune(
    archive_dir: &Path,
    tz: FixedOffset,
    keep_years: i32,
    now: DateTime<Utc>,
) -> Result<Vec<MonthKey>> {
    let cutoff = MonthKey::from_instant(now, tz).years_back(keep_years);

    let mut removed = Vec::new();
    for key in store::list_months(archive_dir)? {
        if key < cutoff {
            let path = store::partition_path(archive_dir, key);
            fs::remove_file(&path).with_context(|| format!("deleting {}", path.display()))?;
            info!(month = %key, "partition pruned");
            removed.push(key);
        }
    }

    remove_empty_year_dirs(archive_dir)?;
    Ok(removed)
}

fn remove_empty_year_dirs(archive_dir: &Path) -> Result<()> {
    let entries = match fs::read_dir(archive_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("listing {}", archive_dir.display())),
    };

    for entry in entries {
        let entry = entry.with_context(|| format!("listing {}", archive_dir.display()))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !path.is_dir() || !store::is_year_dir_name(&name) {
            continue;
        }

        let has_partitions = fs::read_dir(&path)
            .with_context(|| format!("listing {}", path.display()))?
            .filter_map(|e| e.ok())
            .any(|e| e.file_name().to_string_lossy().ends_with(PARTITION_SUFFIX));

        if !has_partitions {
            fs::remove_dir_all(&path).with_context(|| format!("removing {}", path.display()))?;
            info!(year = %name, "empty year directory removed");
        }
    }
    Ok(())
}
