//! RSS 2.0 fetch + parse. The fetch side is a trait so harvest runs can be
//! driven from fixtures in tests; the parse side is `quick-xml` with serde
//! derives over the channel/item shape.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

/// Per-feed failure. Isolated to the feed it names; never aborts a
/// harvest run.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("feed {url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("malformed feed {url}: {message}")]
    Parse { url: String, message: String },
}

/// A normalized feed entry, before it becomes an article stub.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub url: String,
    pub headline: String,
    pub raw_content: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Feed document retrieval. The HTTP implementation is the production
/// path; tests substitute a fixture map.
#[async_trait]
pub trait FeedFetch: Send + Sync {
    async fn fetch(&self, feed_url: &str) -> Result<String, FetchError>;
}

pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("news-prism/0.1 (+rss-harvester)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetch for HttpFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<String, FetchError> {
        let resp = self
            .http
            .get(feed_url)
            .send()
            .await
            .map_err(|e| FetchError::Http {
                url: feed_url.to_string(),
                source: e,
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: feed_url.to_string(),
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| FetchError::Http {
            url: feed_url.to_string(),
            source: e,
        })
    }
}

/// Fixture-backed fetcher for tests: feed URL → canned XML.
#[derive(Default)]
pub struct FixtureFetcher {
    fixtures: HashMap<String, String>,
}

impl FixtureFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feed_url: &str, xml: &str) -> Self {
        self.fixtures.insert(feed_url.to_string(), xml.to_string());
        self
    }
}

#[async_trait]
impl FeedFetch for FixtureFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<String, FetchError> {
        self.fixtures
            .get(feed_url)
            .cloned()
            .ok_or_else(|| FetchError::Parse {
                url: feed_url.to_string(),
                message: "no fixture registered".to_string(),
            })
    }
}

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Parse one RSS document into normalized entries. Entries without a link
/// or a title are dropped; entry text is the title joined with the
/// description, normalized.
pub fn parse_feed(feed_url: &str, xml: &str) -> Result<Vec<FeedItem>, FetchError> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&xml_clean).map_err(|e| FetchError::Parse {
        url: feed_url.to_string(),
        message: e.to_string(),
    })?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let url = it.link.as_deref().unwrap_or_default().trim().to_string();
        let headline = normalize_text(it.title.as_deref().unwrap_or_default());
        if url.is_empty() || headline.is_empty() {
            continue;
        }
        let raw_content = normalize_text(it.description.as_deref().unwrap_or_default());

        out.push(FeedItem {
            url,
            headline,
            raw_content,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("harvest_parse_ms").record(ms);
    Ok(out)
}

/// Normalize entry text: decode HTML entities, strip tags, normalize
/// typographic quotes, collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 5000 chars (analysis prompt budget)
    if out.chars().count() > 5_000 {
        out = out.chars().take(5_000).collect();
    }

    out
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
