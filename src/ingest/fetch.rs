// src/ingest/fetch.rs
use std::fmt;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::header::{ACCEPT, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, USER_AGENT};

use crate::ingest::cache::RevalidationRecord;

/// Identifies the collector to feed servers; some origins reject blank agents.
pub const COLLECTOR_USER_AGENT: &str = "feed-archiver/0.1 (+https://github.com/)";

/// MIME types feeds are actually served under, wildcarded because servers lie.
pub const FEED_ACCEPT: &str =
    "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// What one conditional fetch produced.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh body bytes; cached validators have been refreshed.
    Modified(Vec<u8>),
    /// The server confirmed our cached copy is still current.
    NotModified,
}

/// Per-source failure reason, consumed by the metrics and log paths.
/// Never propagated: one bad source must not abort the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// A response arrived with a status other than 2xx/304.
    Http(u16),
    /// Connect/read/timeout error before a usable response.
    Transport(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Http(status) => write!(f, "http status {status}"),
            FetchFailure::Transport(msg) => write!(f, "transport: {msg}"),
        }
    }
}

/// The raw response surface the revalidation logic needs. The seam lets
/// tests feed canned responses without a network.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<TransportResponse>;
}

/// Production transport over a shared `reqwest` client. The per-request
/// timeout is fixed at construction; exceeding it surfaces as a transport
/// error, not a fatal one.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(
        &self,
        url: &str,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<TransportResponse> {
        let mut req = self
            .client
            .get(url)
            .header(USER_AGENT, COLLECTOR_USER_AGENT)
            .header(ACCEPT, FEED_ACCEPT);
        if let Some(tag) = etag {
            req = req.header(IF_NONE_MATCH, tag);
        }
        if let Some(lm) = last_modified {
            req = req.header(IF_MODIFIED_SINCE, lm);
        }

        let resp = req.send().await.with_context(|| format!("requesting {url}"))?;
        let status = resp.status().as_u16();
        let etag = resp
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let last_modified = resp
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .await
            .with_context(|| format!("reading body from {url}"))?
            .to_vec();

        Ok(TransportResponse {
            status,
            etag,
            last_modified,
            body,
        })
    }
}

/// Conditional fetcher: one retrieval per source per run, revalidated
/// against the cached record.
pub struct Fetcher<T: FeedTransport> {
    transport: T,
}

impl<T: FeedTransport> Fetcher<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Perform the retrieval and fold the response into a fresh
    /// `RevalidationRecord`. The record is returned on every path:
    /// success, not-modified, and failure all update `last_status` and
    /// `last_checked_at`. Validators are only ever overwritten by fresher
    /// ones; a response that omits them never invalidates what we hold.
    /// Elapsed time covers the network call only.
    pub async fn fetch(
        &self,
        url: &str,
        cached: Option<&RevalidationRecord>,
    ) -> (Result<FetchOutcome, FetchFailure>, RevalidationRecord, Duration) {
        let etag = cached.and_then(|r| r.etag.as_deref());
        let last_modified = cached.and_then(|r| r.last_modified.as_deref());

        let t0 = Instant::now();
        let resp = self.transport.get(url, etag, last_modified).await;
        let elapsed = t0.elapsed();

        let mut record = cached.cloned().unwrap_or_default();
        record.last_checked_at = now_stamp();

        let outcome = match resp {
            Err(e) => {
                record.last_status = 0;
                Err(FetchFailure::Transport(format!("{e:#}")))
            }
            Ok(r) => {
                record.last_status = r.status;
                if r.etag.is_some() {
                    record.etag = r.etag;
                }
                if r.last_modified.is_some() {
                    record.last_modified = r.last_modified;
                }
                match r.status {
                    304 => Ok(FetchOutcome::NotModified),
                    s if (200..300).contains(&s) => Ok(FetchOutcome::Modified(r.body)),
                    s => Err(FetchFailure::Http(s)),
                }
            }
        };

        (outcome, record, elapsed)
    }
}

fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
