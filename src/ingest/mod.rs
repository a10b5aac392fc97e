// src/ingest/mod.rs
pub mod cache;
pub mod feed;
pub mod fetch;
pub mod normalize;
pub mod types;

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::SourceSpec;
use crate::ingest::cache::RevalidationCache;
use crate::ingest::fetch::{FeedTransport, FetchOutcome, Fetcher};
use crate::ingest::types::FeedItem;
use crate::metrics::SourceMetric;

/// Collapse a batch to one item per link, keeping the item with the
/// strictly newest publication instant; timestamp ties keep the first one
/// seen. Keyed on an ordered map so downstream iteration is stable.
pub fn dedupe_by_link(items: Vec<FeedItem>) -> BTreeMap<String, FeedItem> {
    let mut best: BTreeMap<String, FeedItem> = BTreeMap::new();
    for item in items {
        match best.get(&item.link) {
            Some(current) if item.pub_date <= current.pub_date => {}
            _ => {
                best.insert(item.link.clone(), item);
            }
        }
    }
    best
}

/// Fetch every source once, parse and normalize what came back, and record
/// one metric per source. Mutates `cache` in place with the post-fetch
/// validator records. Per-source trouble (transport errors, bad statuses,
/// malformed XML) is logged and reported, never propagated: the remaining
/// sources still run.
pub async fn collect_once<T: FeedTransport>(
    fetcher: &Fetcher<T>,
    sources: &[SourceSpec],
    cache: &mut RevalidationCache,
) -> (Vec<FeedItem>, Vec<SourceMetric>) {
    let mut items: Vec<FeedItem> = Vec::new();
    let mut metrics = Vec::with_capacity(sources.len());

    for src in sources {
        let (outcome, record, elapsed) = fetcher.fetch(&src.url, cache.get(&src.url)).await;
        let status = record.last_status;
        cache.insert(src.url.clone(), record);

        let mut metric = SourceMetric::for_source(src, status, elapsed);

        match outcome {
            Ok(FetchOutcome::NotModified) => {
                info!(source = %src.name, "feed not modified");
            }
            Ok(FetchOutcome::Modified(body)) => {
                metric.bytes = body.len() as u64;
                let xml = String::from_utf8_lossy(&body);
                match feed::parse_feed(&xml) {
                    Ok(entries) => {
                        let now = Utc::now();
                        let before = items.len();
                        items.extend(
                            entries
                                .iter()
                                .filter_map(|e| normalize::normalize(e, &src.name, &src.category, now)),
                        );
                        metric.items = (items.len() - before) as u64;
                        info!(
                            source = %src.name,
                            items = metric.items,
                            bytes = metric.bytes,
                            "feed collected"
                        );
                    }
                    Err(e) => {
                        let msg = format!("{e:#}");
                        warn!(source = %src.name, url = %src.url, error = %msg, "feed parse failed");
                        metric.error = Some(msg);
                    }
                }
            }
            Err(failure) => {
                warn!(source = %src.name, url = %src.url, error = %failure, "feed fetch failed");
                metric.error = Some(failure.to_string());
            }
        }

        metrics.push(metric);
    }

    (items, metrics)
}
