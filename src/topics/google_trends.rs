use anyhow::Result;
use std::time::Duration;

use super::rss::{fetch_feed, Feed};
use super::{TopicCandidate, TopicSource};
use crate::clients::http_client;
use crate::config::TopicSourceConfig;

const TRENDS_RSS: &str = "https://trends.google.com/trending/rss";
const DEFAULT_GEO: &str = "IN";

/// Daily trending searches for one region, read from the Trends RSS feed.
pub struct GoogleTrendsSource {
    geo: String,
    client: reqwest::blocking::Client,
}

/// Rank 0 scores 1.0, each rank below loses 0.05, floor 0.1.
pub fn rank_score(rank: usize) -> f64 {
    (1.0 - 0.05 * rank as f64).max(0.1)
}

fn trend_candidates(feed: Feed, limit: usize) -> Vec<TopicCandidate> {
    feed.entries
        .into_iter()
        .filter(|e| !e.title.is_empty())
        .take(limit)
        .enumerate()
        .map(|(rank, e)| {
            let mut candidate = TopicCandidate::new(e.title, "google_trends", rank_score(rank));
            candidate.url = e.link;
            candidate
        })
        .collect()
}

impl GoogleTrendsSource {
    pub fn from_config(config: &TopicSourceConfig) -> Result<Self> {
        Ok(Self {
            geo: config
                .geo
                .clone()
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEO.to_string())
                .to_uppercase(),
            client: http_client(Duration::from_secs(10))?,
        })
    }

    pub fn feed_url(&self) -> String {
        format!("{TRENDS_RSS}?geo={}", self.geo)
    }
}

impl TopicSource for GoogleTrendsSource {
    fn name(&self) -> &str {
        "google_trends"
    }

    fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>> {
        let feed = fetch_feed(&self.client, &self.feed_url())?;
        Ok(trend_candidates(feed, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::rss::parse_feed;

    #[test]
    fn score_decays_with_rank() {
        assert_eq!(rank_score(0), 1.0);
        assert!((rank_score(4) - 0.8).abs() < 1e-9);
        assert!((rank_score(18) - 0.1).abs() < 1e-9);
        assert_eq!(rank_score(30), 0.1);
    }

    #[test]
    fn trends_feed_to_candidates() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:ht="https://trends.google.com/trending/rss">
  <channel>
    <title>Daily Search Trends</title>
    <item><title>ipl final</title><ht:approx_traffic>500000+</ht:approx_traffic></item>
    <item><title>monsoon update</title></item>
    <item><title>gold price</title></item>
  </channel>
</rss>"#;
        let topics = trend_candidates(parse_feed(xml).unwrap(), 2);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].title, "ipl final");
        assert_eq!(topics[0].source, "google_trends");
        assert_eq!(topics[0].trending_score, 1.0);
        assert!((topics[1].trending_score - 0.95).abs() < 1e-9);
    }

    #[test]
    fn geo_from_config() {
        let cfg = TopicSourceConfig {
            geo: Some("us".into()),
            ..Default::default()
        };
        let source = GoogleTrendsSource::from_config(&cfg).unwrap();
        assert_eq!(source.feed_url(), "https://trends.google.com/trending/rss?geo=US");

        let source = GoogleTrendsSource::from_config(&TopicSourceConfig::default()).unwrap();
        assert!(source.feed_url().ends_with("geo=IN"));
    }
}
