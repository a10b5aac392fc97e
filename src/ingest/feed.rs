// src/ingest/feed.rs
use anyhow::{Context, Result};
use quick_xml::de::from_str;
use serde::Deserialize;

/// One syndication entry as it appears on the wire, before normalization.
/// All fields are free text; resolution happens in `normalize`.
#[derive(Debug, Clone, Default)]
pub struct RawEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "dc:date")]
    dc_date: Option<String>,
}

impl From<RssItem> for RawEntry {
    fn from(it: RssItem) -> Self {
        RawEntry {
            title: it.title,
            link: it.link,
            published: it.pub_date.or(it.dc_date),
            updated: None,
        }
    }
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    published: Option<String>,
    updated: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl From<AtomEntry> for RawEntry {
    fn from(e: AtomEntry) -> Self {
        // The page link is the rel-less or rel="alternate" one; anything
        // else (self, enclosure, ...) only as a last resort.
        let link = e
            .link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| e.link.first())
            .and_then(|l| l.href.clone());
        RawEntry {
            title: e.title,
            link,
            published: e.published,
            updated: e.updated,
        }
    }
}

/// Parse either RSS 2.0 or Atom into raw entries. The syntax is sniffed
/// from the root element rather than the content type, which lies often
/// enough to be useless.
pub fn parse_feed(xml: &str) -> Result<Vec<RawEntry>> {
    let xml = scrub_html_entities_for_xml(xml.trim_start_matches('\u{feff}'));
    if looks_like_atom(&xml) {
        let feed: AtomFeed = from_str(&xml).context("parsing atom feed")?;
        Ok(feed.entry.into_iter().map(RawEntry::from).collect())
    } else {
        let rss: Rss = from_str(&xml).context("parsing rss feed")?;
        Ok(rss.channel.item.into_iter().map(RawEntry::from).collect())
    }
}

fn looks_like_atom(xml: &str) -> bool {
    // The first real element decides; skip prolog, comments and doctype.
    for part in xml.split('<').skip(1) {
        let name = part.trim_start();
        if name.starts_with('?') || name.starts_with('!') {
            continue;
        }
        return name.starts_with("feed");
    }
    false
}

/// HTML entities that are not XML entities break strict parsing; fold the
/// common offenders before handing the document to quick-xml.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_items_come_out_with_pub_dates() {
        let xml = r#"<?xml version="1.0"?>
            <rss version="2.0"><channel>
              <title>Wire</title>
              <item>
                <title>First</title>
                <link>https://example.test/1</link>
                <pubDate>Mon, 06 Jan 2025 09:00:00 +0900</pubDate>
              </item>
              <item>
                <title>No date</title>
                <link>https://example.test/2</link>
              </item>
            </channel></rss>"#;

        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title.as_deref(), Some("First"));
        assert_eq!(entries[0].link.as_deref(), Some("https://example.test/1"));
        assert_eq!(
            entries[0].published.as_deref(),
            Some("Mon, 06 Jan 2025 09:00:00 +0900")
        );
        assert!(entries[1].published.is_none());
    }

    #[test]
    fn atom_prefers_the_alternate_link() {
        let xml = r#"<?xml version="1.0"?>
            <feed xmlns="http://www.w3.org/2005/Atom">
              <entry>
                <title>Entry</title>
                <link rel="self" href="https://example.test/feed.atom"/>
                <link rel="alternate" href="https://example.test/page"/>
                <updated>2025-01-06T00:00:00Z</updated>
              </entry>
            </feed>"#;

        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link.as_deref(), Some("https://example.test/page"));
        assert!(entries[0].published.is_none());
        assert_eq!(entries[0].updated.as_deref(), Some("2025-01-06T00:00:00Z"));
    }

    #[test]
    fn html_entities_do_not_break_parsing() {
        let xml = r#"<rss version="2.0"><channel>
            <item><title>A&nbsp;&ndash;&nbsp;B</title><link>https://example.test/3</link></item>
        </channel></rss>"#;
        let entries = parse_feed(xml).unwrap();
        assert_eq!(entries[0].title.as_deref(), Some("A - B"));
    }

    #[test]
    fn garbage_is_an_error_not_a_panic() {
        assert!(parse_feed("this is not xml").is_err());
        assert!(parse_feed("<html><body>404</body></html>").is_err());
    }
}
