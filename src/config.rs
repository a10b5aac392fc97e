// src/config.rs
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::FixedOffset;
use serde::Deserialize;

const ENV_ROOT: &str = "ARCHIVE_ROOT";
const ENV_SOURCES_PATH: &str = "ARCHIVE_SOURCES_PATH";
const ENV_KEEP_YEARS: &str = "ARCHIVE_KEEP_YEARS";
const ENV_LATEST_MONTHS: &str = "ARCHIVE_LATEST_MONTHS";
const ENV_TIMEOUT_SECS: &str = "ARCHIVE_TIMEOUT_SECS";
const ENV_TZ_OFFSET_HOURS: &str = "ARCHIVE_TZ_OFFSET_HOURS";

/// Run-wide settings, built once in `main` and threaded through every
/// pipeline stage. No component reads the environment after this point.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Root under which `archive/`, `docs/data/`, `cache/` and `config/` live.
    pub root: PathBuf,
    /// Rolling retention bound: partitions older than this many years are deleted.
    pub keep_years: i32,
    /// Width of the latest window in months, current month included.
    pub latest_months: u32,
    /// Per-request network timeout.
    pub timeout_secs: u64,
    /// Civil timezone for month bucketing. The archive historically ran in UTC+9.
    pub tz: FixedOffset,
}

impl ArchiveConfig {
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep_years: 5,
            latest_months: 3,
            timeout_secs: 25,
            tz: FixedOffset::east_opt(9 * 3600).expect("valid fixed offset"),
        }
    }

    /// Resolve configuration from the environment, falling back to the
    /// defaults above. Invalid values are fatal: a run with a half-read
    /// configuration must not touch the archive.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::with_root(env::var(ENV_ROOT).unwrap_or_else(|_| ".".into()));
        cfg.keep_years = env_parsed(ENV_KEEP_YEARS, cfg.keep_years)?;
        cfg.latest_months = env_parsed(ENV_LATEST_MONTHS, cfg.latest_months)?;
        cfg.timeout_secs = env_parsed(ENV_TIMEOUT_SECS, cfg.timeout_secs)?;

        let offset_hours: i32 = env_parsed(ENV_TZ_OFFSET_HOURS, 9)?;
        cfg.tz = FixedOffset::east_opt(offset_hours * 3600)
            .ok_or_else(|| anyhow!("invalid {ENV_TZ_OFFSET_HOURS}={offset_hours}"))?;

        if cfg.keep_years < 1 {
            bail!("{ENV_KEEP_YEARS} must be at least 1");
        }
        if cfg.latest_months < 1 {
            bail!("{ENV_LATEST_MONTHS} must be at least 1");
        }
        Ok(cfg)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("docs").join("data")
    }

    pub fn index_path(&self) -> PathBuf {
        self.data_dir().join("index.json")
    }

    pub fn latest_path(&self) -> PathBuf {
        self.data_dir().join("latest.ndjson")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.data_dir().join("metrics.json")
    }

    pub fn cache_path(&self) -> PathBuf {
        self.root.join("cache").join("http_cache.json")
    }
}

fn env_parsed<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("invalid {key}={raw}: {e}")),
        Err(_) => Ok(default),
    }
}

fn default_enabled() -> bool {
    true
}

/// One feed as described by the source registry. Read-only to the pipeline;
/// immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    #[serde(alias = "id")]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SourceSpec {
    /// Only enabled entries with a usable URL take part in a run.
    pub fn participating(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }
}

/// Load the source registry for this run. Resolution order:
/// 1) `$ARCHIVE_SOURCES_PATH`
/// 2) `<root>/config/sources.json`
/// 3) `<root>/config/sources.toml`
/// A missing or malformed registry is fatal and aborts before any fetch.
pub fn load_sources(cfg: &ArchiveConfig) -> Result<Vec<SourceSpec>> {
    if let Ok(p) = env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            bail!("{ENV_SOURCES_PATH} points to non-existent path {}", pb.display());
        }
        return load_sources_from(&pb);
    }
    let json_p = cfg.root.join("config").join("sources.json");
    if json_p.exists() {
        return load_sources_from(&json_p);
    }
    let toml_p = cfg.root.join("config").join("sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    bail!(
        "no source registry found under {} (expected config/sources.json or config/sources.toml)",
        cfg.root.display()
    )
}

/// Load from an explicit path. Supports JSON (bare array) and TOML
/// (`[[sources]]` tables).
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceSpec>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading source registry from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing source registry {}", path.display()))
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceSpec>> {
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    bail!("unsupported source registry format")
}

fn parse_toml(s: &str) -> Result<Vec<SourceSpec>> {
    #[derive(Deserialize)]
    struct TomlRegistry {
        sources: Vec<SourceSpec>,
    }
    let v: TomlRegistry = toml::from_str(s)?;
    Ok(v.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceSpec>> {
    let v: Vec<SourceSpec> = serde_json::from_str(s)?;
    Ok(v)
}
