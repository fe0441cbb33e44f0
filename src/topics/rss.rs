use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{TopicCandidate, TopicSource};
use crate::clients::http_client;
use crate::config::TopicSourceConfig;

const DEFAULT_FEEDS: &[&str] = &["https://hnrss.org/frontpage"];
const RSS_SCORE: f64 = 0.5;
const SUMMARY_CHARS: usize = 200;
const LABEL_CHARS: usize = 30;

/// A parsed RSS 2.0 or Atom feed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Feed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeedEntry {
    pub title: String,
    pub link: String,
    pub summary: String,
}

#[derive(Deserialize)]
struct RssDoc {
    channel: RssChannel,
}

#[derive(Deserialize)]
struct RssChannel {
    title: Option<String>,
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct AtomDoc {
    title: Option<String>,
    #[serde(default, rename = "entry")]
    entries: Vec<AtomEntry>,
}

#[derive(Deserialize)]
struct AtomEntry {
    title: Option<String>,
    #[serde(default)]
    link: Vec<AtomLink>,
    summary: Option<String>,
}

#[derive(Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
}

pub fn parse_feed(xml: &str) -> Result<Feed> {
    let is_atom = xml.contains("<feed") && !xml.contains("<rss");
    if is_atom {
        let doc: AtomDoc = quick_xml::de::from_str(xml).context("Failed to parse Atom feed")?;
        return Ok(Feed {
            title: doc.title,
            entries: doc
                .entries
                .into_iter()
                .map(|e| FeedEntry {
                    title: e.title.unwrap_or_default().trim().to_string(),
                    link: e.link.into_iter().find_map(|l| l.href).unwrap_or_default(),
                    summary: e.summary.unwrap_or_default(),
                })
                .collect(),
        });
    }
    let doc: RssDoc = quick_xml::de::from_str(xml).context("Failed to parse RSS feed")?;
    Ok(Feed {
        title: doc.channel.title,
        entries: doc
            .channel
            .items
            .into_iter()
            .map(|i| FeedEntry {
                title: i.title.unwrap_or_default().trim().to_string(),
                link: i.link.unwrap_or_default(),
                summary: i.description.unwrap_or_default(),
            })
            .collect(),
    })
}

pub(crate) fn fetch_feed(client: &reqwest::blocking::Client, url: &str) -> Result<Feed> {
    let body = client
        .get(url)
        .send()
        .with_context(|| format!("Failed to fetch {url}"))?
        .error_for_status()?
        .text()?;
    parse_feed(&body)
}

fn feed_candidates(feed: Feed, url: &str, per_feed: usize) -> Vec<TopicCandidate> {
    let label: String = feed
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(url)
        .trim()
        .chars()
        .take(LABEL_CHARS)
        .collect();
    feed.entries
        .into_iter()
        .filter(|e| !e.title.is_empty())
        .take(per_feed)
        .map(|e| {
            let mut candidate = TopicCandidate::new(e.title, format!("rss/{label}"), RSS_SCORE);
            candidate.summary = e.summary.chars().take(SUMMARY_CHARS).collect();
            candidate.url = e.link;
            candidate
        })
        .collect()
}

/// Latest entries from configured feeds. Feeds carry no popularity signal so
/// every entry gets the same score.
pub struct RssSource {
    feeds: Vec<String>,
    client: reqwest::blocking::Client,
}

impl RssSource {
    pub fn from_config(config: &TopicSourceConfig) -> Result<Self> {
        let feeds = config
            .feeds
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect());
        Ok(Self {
            feeds,
            client: http_client(Duration::from_secs(10))?,
        })
    }
}

impl TopicSource for RssSource {
    fn name(&self) -> &str {
        "rss"
    }

    fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>> {
        let per_feed = (limit / self.feeds.len().max(1)).max(1);
        let mut topics = Vec::new();
        for url in &self.feeds {
            match fetch_feed(&self.client, url) {
                Ok(feed) => topics.extend(feed_candidates(feed, url, per_feed)),
                Err(e) => debug!("feed {url} skipped: {e:#}"),
            }
        }
        topics.truncate(limit);
        Ok(topics)
    }
}
