use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{TopicCandidate, TopicSource};
use crate::clients::http_client;
use crate::config::TopicSourceConfig;

const DEFAULT_SUBREDDITS: &[&str] = &["technology", "worldnews"];
const SUMMARY_CHARS: usize = 200;

/// Hot posts from one or more subreddits via the public `.json` listings.
pub struct RedditSource {
    subreddits: Vec<String>,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Deserialize)]
struct Child {
    data: Post,
}

#[derive(Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    stickied: bool,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    num_comments: u64,
}

/// Log-scaled upvotes: 10k and above is 1.0.
pub fn normalize_score(score: i64) -> f64 {
    ((score.max(1) as f64).log10() / 4.0).min(1.0)
}

fn parse_listing(json: &str, subreddit: &str) -> Result<Vec<TopicCandidate>> {
    let listing: Listing = serde_json::from_str(json).context("Failed to parse Reddit listing")?;
    Ok(listing
        .data
        .children
        .into_iter()
        .map(|c| c.data)
        .filter(|post| !post.stickied)
        .map(|post| {
            let mut candidate = TopicCandidate::new(
                post.title,
                format!("reddit/r/{subreddit}"),
                normalize_score(post.score),
            );
            candidate.summary = post.selftext.chars().take(SUMMARY_CHARS).collect();
            candidate.url = format!("https://reddit.com{}", post.permalink);
            candidate.metadata.insert("score".into(), post.score.into());
            candidate
                .metadata
                .insert("num_comments".into(), post.num_comments.into());
            candidate
        })
        .collect())
}

impl RedditSource {
    pub fn from_config(config: &TopicSourceConfig) -> Result<Self> {
        let subreddits = config
            .subreddits
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBREDDITS.iter().map(|s| s.to_string()).collect());
        Ok(Self {
            subreddits,
            client: http_client(Duration::from_secs(10))?,
        })
    }

    fn fetch_subreddit(&self, subreddit: &str, limit: usize) -> Result<Vec<TopicCandidate>> {
        let body = self
            .client
            .get(format!("https://www.reddit.com/r/{subreddit}/hot.json"))
            .query(&[("limit", limit + 2)])
            .send()
            .with_context(|| format!("Failed to fetch r/{subreddit}"))?
            .error_for_status()?
            .text()?;
        parse_listing(&body, subreddit)
    }
}

impl TopicSource for RedditSource {
    fn name(&self) -> &str {
        "reddit"
    }

    fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>> {
        let per_sub = (limit / self.subreddits.len().max(1)).max(1);
        let mut topics = Vec::new();
        for sub in &self.subreddits {
            match self.fetch_subreddit(sub, per_sub) {
                Ok(found) => topics.extend(found),
                Err(e) => debug!("r/{sub} skipped: {e:#}"),
            }
        }
        topics.truncate(limit);
        Ok(topics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_normalization() {
        assert_eq!(normalize_score(0), 0.0);
        assert_eq!(normalize_score(-5), 0.0);
        assert!((normalize_score(100) - 0.5).abs() < 1e-9);
        assert_eq!(normalize_score(10_000), 1.0);
        assert_eq!(normalize_score(1_000_000), 1.0);
    }

    #[test]
    fn skips_stickied_posts() {
        let json = r#"{"kind":"Listing","data":{"children":[
            {"kind":"t3","data":{"title":"Weekly thread","stickied":true,"score":50000}},
            {"kind":"t3","data":{"title":"Chip breakthrough","score":1000,
              "selftext":"details","permalink":"/r/technology/comments/abc/","num_comments":42}}
        ]}}"#;
        let topics = parse_listing(json, "technology").unwrap();
        assert_eq!(topics.len(), 1);
        let t = &topics[0];
        assert_eq!(t.title, "Chip breakthrough");
        assert_eq!(t.source, "reddit/r/technology");
        assert!((t.trending_score - 0.75).abs() < 1e-9);
        assert_eq!(t.url, "https://reddit.com/r/technology/comments/abc/");
        assert_eq!(t.metadata["num_comments"], 42);
    }

    #[test]
    fn default_subreddits() {
        let source = RedditSource::from_config(&TopicSourceConfig::default()).unwrap();
        assert_eq!(source.subreddits, vec!["technology", "worldnews"]);
    }
}
