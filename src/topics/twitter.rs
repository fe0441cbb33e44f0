use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use super::{TopicCandidate, TopicSource};
use crate::clients::{check_status, http_client};
use crate::config::TopicSourceConfig;

const TRENDS_ENDPOINT: &str = "https://api.twitter.com/2/trends/by/woeid/1";
const TWITTER_SCORE: f64 = 0.7;

/// Worldwide X/Twitter trends. Needs a bearer token, either in config or
/// `TWITTER_BEARER_TOKEN`.
pub struct TwitterSource {
    bearer_token: Option<String>,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct TrendsResponse {
    #[serde(default)]
    data: Vec<Trend>,
}

#[derive(Deserialize)]
struct Trend {
    #[serde(default)]
    trend_name: String,
    #[serde(default)]
    tweet_count: u64,
}

fn parse_trends(json: &str, limit: usize) -> Result<Vec<TopicCandidate>> {
    let resp: TrendsResponse = serde_json::from_str(json).context("Failed to parse trends")?;
    Ok(resp
        .data
        .into_iter()
        .filter(|t| !t.trend_name.is_empty())
        .take(limit)
        .map(|t| {
            let mut candidate = TopicCandidate::new(t.trend_name, "twitter", TWITTER_SCORE);
            candidate
                .metadata
                .insert("tweet_count".into(), t.tweet_count.into());
            candidate
        })
        .collect())
}

impl TwitterSource {
    pub fn from_config(config: &TopicSourceConfig) -> Result<Self> {
        let bearer_token = config
            .bearer_token
            .clone()
            .or_else(|| std::env::var("TWITTER_BEARER_TOKEN").ok())
            .filter(|t| !t.is_empty());
        Ok(Self {
            bearer_token,
            client: http_client(Duration::from_secs(10))?,
        })
    }
}

impl TopicSource for TwitterSource {
    fn name(&self) -> &str {
        "twitter"
    }

    fn is_available(&self) -> bool {
        self.bearer_token.is_some()
    }

    fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>> {
        let token = self
            .bearer_token
            .as_deref()
            .context("No Twitter bearer token configured")?;
        let resp = self
            .client
            .get(TRENDS_ENDPOINT)
            .bearer_auth(token)
            .send()
            .context("Failed to fetch Twitter trends")?;
        let body = check_status("twitter", resp)?.text()?;
        parse_trends(&body, limit)
    }
}
