// src/archive/month.rs
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, Utc};

/// Identifies one archive partition: a calendar month in the archive's
/// fixed civil timezone. Ordering on `(year, month)` matches ordering of
/// the months' first-of-month instants, which is what retention compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    /// Bucket a publication instant by the civil month it falls in under
    /// `tz`. An item's month assignment never changes after first archival.
    pub fn from_instant(ts: DateTime<Utc>, tz: FixedOffset) -> Self {
        let local = ts.with_timezone(&tz);
        Self {
            year: local.year(),
            month: local.month(),
        }
    }

    /// The month `n` steps before this one (`n = 0` is self).
    pub fn months_back(self, n: u32) -> Self {
        let total = self.year as i64 * 12 + (self.month as i64 - 1) - n as i64;
        Self {
            year: total.div_euclid(12) as i32,
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    /// The same calendar month `years` back; the retention cutoff.
    pub fn years_back(self, years: i32) -> Self {
        Self {
            year: self.year - years,
            month: self.month,
        }
    }

    /// The `len` months ending at (and including) self, ascending.
    pub fn window_ending_here(self, len: u32) -> Vec<Self> {
        let mut keys: Vec<Self> = (0..len).map(|i| self.months_back(i)).collect();
        keys.sort();
        keys
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (y, m) = s
            .split_once('-')
            .ok_or_else(|| anyhow!("bad month key: {s}"))?;
        if y.len() != 4 || m.len() != 2 {
            return Err(anyhow!("bad month key: {s}"));
        }
        let year: i32 = y.parse().map_err(|_| anyhow!("bad month key: {s}"))?;
        let month: u32 = m.parse().map_err(|_| anyhow!("bad month key: {s}"))?;
        if !(1..=12).contains(&month) {
            return Err(anyhow!("bad month key: {s}"));
        }
        Ok(Self { year, month })
    }
}

/// Second-precision ISO-8601 stamp in the archive's civil timezone,
/// e.g. `2026-08-07T09:00:00+09:00`. Used for `generatedAt` fields.
pub fn civil_stamp(ts: DateTime<Utc>, tz: FixedOffset) -> String {
    ts.with_timezone(&tz).format("%Y-%m-%dT%H:%M:%S%:z").to_string()
}
