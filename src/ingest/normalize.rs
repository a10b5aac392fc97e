// src/ingest/normalize.rs
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::ingest::feed::RawEntry;
use crate::ingest::types::FeedItem;

/// Collapse a wire title to plain text: entity decode, tag strip, fold
/// whitespace, trim. Extraction hygiene only; the text is otherwise
/// untouched.
pub fn clean_title(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();

    out.trim().to_string()
}

/// Turn a raw entry into an archivable item. Requires a non-empty trimmed
/// title AND link; anything else is dropped here and never enters the
/// archive. `now` is the fallback instant for undated entries, passed in
/// so callers stamp one consistent value per batch.
pub fn normalize(
    entry: &RawEntry,
    source: &str,
    category: &str,
    now: DateTime<Utc>,
) -> Option<FeedItem> {
    let title = clean_title(entry.title.as_deref().unwrap_or_default());
    let link = entry.link.as_deref().unwrap_or_default().trim().to_string();
    if title.is_empty() || link.is_empty() {
        return None;
    }

    let pub_date = to_seconds(resolve_pub_date(
        entry.published.as_deref(),
        entry.updated.as_deref(),
        now,
    ));

    Some(FeedItem {
        title,
        link,
        pub_date,
        source: source.to_string(),
        category: category.to_string(),
    })
}

/// Resolution order for the publication instant: structured `published`,
/// structured `updated`, best-effort free-text parse (tagged UTC when no
/// offset is given, converted to UTC otherwise), then `now`. The chain
/// decides month-bucket placement for malformed feeds, so the order is
/// load-bearing.
pub fn resolve_pub_date(
    published: Option<&str>,
    updated: Option<&str>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    published
        .and_then(parse_structured)
        .or_else(|| updated.and_then(parse_structured))
        .or_else(|| published.and_then(parse_freeform))
        .or_else(|| updated.and_then(parse_freeform))
        .unwrap_or(now)
}

/// The two well-known formats feeds are supposed to use: RFC 2822 for RSS
/// `pubDate`, RFC 3339 for Atom timestamps.
fn parse_structured(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    OffsetDateTime::parse(s, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(s, &Rfc3339))
        .ok()
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// Last-ditch parse of the date shapes that show up in the wild once the
/// strict parsers have failed: RFC 2822 with obsolete zone names ("GMT",
/// "EST"), offset-bearing and naive local shapes. Naive values are tagged
/// UTC.
fn parse_freeform(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S %z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|n| n.and_utc());
        }
    }
    None
}

/// The archive stores second precision; drop anything finer.
fn to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(ts.timestamp(), 0).unwrap_or(ts)
}
