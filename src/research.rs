//! Fact gathering for the draft prompt: a web search on the topic's keywords,
//! reduced to a handful of short snippets.

use anyhow::{Context, Result};
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{info, warn};

use crate::retry::RetryPolicy;

const DDG_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_SNIPPETS: usize = 8;
const MAX_SNIPPET_CHARS: usize = 300;
const MAX_KEYWORDS: usize = 4;

pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "from",
    "by", "is", "are", "was", "were", "be", "been", "has", "have", "had", "will", "would",
    "could", "should", "may", "might", "that", "this", "these", "those", "it", "its", "new",
    "ahead", "as", "into", "up", "out", "over", "after",
];

static SNIPPET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<a[^>]*class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</a>"#)
        .expect("valid snippet regex")
});
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Up to four lowercase content words from `text`, space-joined.
pub fn extract_keywords(text: &str) -> String {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c| matches!(c, '.' | ',' | '!' | '?' | '"' | '\'' | '(' | ')' | '[' | ']'))
                .to_lowercase()
        })
        .filter(|w| w.chars().count() > 2 && !STOPWORDS.contains(&w.as_str()))
        .take(MAX_KEYWORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Text used in place of research when nothing could be found.
pub fn no_research_marker(news: &str) -> String {
    format!("Topic: {news}\n(No live research available - script must stay general.)")
}

pub trait WebSearch {
    /// Result snippets for `query`, best first.
    fn snippets(&self, query: &str) -> Result<Vec<String>>;
}

pub struct DuckDuckGo {
    client: reqwest::blocking::Client,
}

impl DuckDuckGo {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("Mozilla/5.0 (compatible; shortreel-research/1.0)")
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl WebSearch for DuckDuckGo {
    fn snippets(&self, query: &str) -> Result<Vec<String>> {
        let html = self
            .client
            .post(DDG_ENDPOINT)
            .form(&[("q", query)])
            .send()
            .context("DuckDuckGo request failed")?
            .error_for_status()
            .context("DuckDuckGo returned an error status")?
            .text()
            .context("Failed to read DuckDuckGo response")?;
        Ok(parse_snippets(&html))
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Plain-text snippets from a DuckDuckGo HTML results page.
pub fn parse_snippets(html: &str) -> Vec<String> {
    SNIPPET_RE
        .captures_iter(html)
        .map(|cap| decode_entities(&TAG_RE.replace_all(&cap[1], "")).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Research `news`, falling back to [`no_research_marker`] on failure or no results.
pub fn research_with(search: &dyn WebSearch, news: &str, policy: RetryPolicy) -> String {
    info!("Researching topic...");
    let keywords = extract_keywords(news);
    let query = if keywords.is_empty() { news } else { keywords.as_str() };

    match policy.run("research", || search.snippets(query)) {
        Ok(snippets) if !snippets.is_empty() => {
            info!("Found {} snippets.", snippets.len());
            snippets
                .iter()
                .take(MAX_SNIPPETS)
                .map(|s| s.chars().take(MAX_SNIPPET_CHARS).collect::<String>())
                .collect::<Vec<_>>()
                .join("\n")
        }
        Ok(_) => {
            info!("No research snippets found - proceeding without.");
            no_research_marker(news)
        }
        Err(e) => {
            warn!("Research failed: {e:#} - proceeding without.");
            no_research_marker(news)
        }
    }
}
