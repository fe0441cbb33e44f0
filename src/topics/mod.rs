//! Trending-topic discovery: several sources fetched in parallel, merged,
//! deduplicated and ranked.

pub mod google_trends;
pub mod reddit;
pub mod rss;
pub mod twitter;

use anyhow::{bail, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::clients::TextGenerator;
use crate::config::{AppConfig, TopicSourceConfig};
use crate::error::PipelineError;
use crate::retry::RetryPolicy;

pub use google_trends::GoogleTrendsSource;
pub use reddit::RedditSource;
pub use rss::RssSource;
pub use twitter::TwitterSource;

const MAX_WORKERS: usize = 5;
pub const SOURCE_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_LIMIT: usize = 15;
const DEDUP_KEY_CHARS: usize = 50;
const AUTO_PICK_MENU: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub title: String,
    pub source: String,
    /// Normalized to 0..=1.
    pub trending_score: f64,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl TopicCandidate {
    pub fn new(title: impl Into<String>, source: impl Into<String>, trending_score: f64) -> Self {
        Self {
            title: title.into(),
            source: source.into(),
            trending_score,
            summary: String::new(),
            url: String::new(),
            metadata: serde_json::Map::new(),
        }
    }
}

/// A place trending topics come from.
pub trait TopicSource: Send + Sync {
    fn name(&self) -> &str;

    fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>>;

    /// Configured and usable. Unavailable sources are skipped silently.
    fn is_available(&self) -> bool {
        true
    }
}

type SourceFactory = fn(&TopicSourceConfig) -> Result<Arc<dyn TopicSource>>;

/// Known sources: (name, enabled when unconfigured, constructor).
pub const SOURCE_REGISTRY: &[(&str, bool, SourceFactory)] = &[
    ("reddit", true, build_reddit),
    ("rss", true, build_rss),
    ("google_trends", true, build_google_trends),
    ("twitter", false, build_twitter),
];

fn build_reddit(cfg: &TopicSourceConfig) -> Result<Arc<dyn TopicSource>> {
    Ok(Arc::new(RedditSource::from_config(cfg)?))
}

fn build_rss(cfg: &TopicSourceConfig) -> Result<Arc<dyn TopicSource>> {
    Ok(Arc::new(RssSource::from_config(cfg)?))
}

fn build_google_trends(cfg: &TopicSourceConfig) -> Result<Arc<dyn TopicSource>> {
    Ok(Arc::new(GoogleTrendsSource::from_config(cfg)?))
}

fn build_twitter(cfg: &TopicSourceConfig) -> Result<Arc<dyn TopicSource>> {
    Ok(Arc::new(TwitterSource::from_config(cfg)?))
}

/// Build the enabled sources from `[topic_sources.<name>]` blocks.
pub fn sources_from_config(config: &AppConfig) -> Vec<Arc<dyn TopicSource>> {
    let mut sources = Vec::new();
    for (name, default_enabled, build) in SOURCE_REGISTRY {
        let cfg = config.topic_source(name).cloned().unwrap_or_default();
        if !cfg.enabled.unwrap_or(*default_enabled) {
            continue;
        }
        match build(&cfg) {
            Ok(source) => sources.push(source),
            Err(e) => warn!("Failed to init source {name}: {e:#}"),
        }
    }
    sources
}

pub struct TopicEngine {
    sources: Vec<Arc<dyn TopicSource>>,
    source_timeout: Duration,
}

impl TopicEngine {
    pub fn new(sources: Vec<Arc<dyn TopicSource>>) -> Self {
        Self {
            sources,
            source_timeout: SOURCE_TIMEOUT,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(sources_from_config(config))
    }

    pub fn with_timeout(mut self, source_timeout: Duration) -> Self {
        self.source_timeout = source_timeout;
        self
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Fetch from every available source, then dedupe and rank. Never fails:
    /// a source that errors or misses its deadline contributes nothing.
    ///
    /// Each source gets `source_timeout` from the moment a worker picks it up.
    /// A worker stuck past that is abandoned and replaced while sources are
    /// still queued, so hung sources never starve the rest of the queue.
    pub fn discover(&self, limit: usize) -> Vec<TopicCandidate> {
        let available: Vec<Arc<dyn TopicSource>> = self
            .sources
            .iter()
            .filter(|s| s.is_available())
            .cloned()
            .collect();
        if available.is_empty() {
            warn!("No topic sources available");
            return Vec::new();
        }

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<(usize, Arc<dyn TopicSource>)>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        for (id, source) in available.iter().enumerate() {
            let _ = job_tx.send((id, Arc::clone(source)));
        }
        drop(job_tx);

        for _ in 0..available.len().min(MAX_WORKERS) {
            spawn_worker(&job_rx, &event_tx, limit);
        }

        let mut in_flight: HashMap<usize, (String, Instant)> = HashMap::new();
        let mut pending = available.len();
        let mut all = Vec::new();

        while pending > 0 {
            let deadline = in_flight
                .values()
                .map(|(_, started)| *started + self.source_timeout)
                .min()
                .unwrap_or_else(|| Instant::now() + self.source_timeout);

            match event_rx.recv_deadline(deadline) {
                Ok(WorkerEvent::Started { id, name, at }) => {
                    in_flight.insert(id, (name, at));
                }
                Ok(WorkerEvent::Finished { id, outcome }) => {
                    // Already written off as timed out.
                    let Some((name, started)) = in_flight.remove(&id) else {
                        continue;
                    };
                    pending -= 1;
                    let elapsed = started.elapsed();
                    if elapsed > self.source_timeout {
                        warn!("{name}: timed out after {:.1}s", elapsed.as_secs_f64());
                        continue;
                    }
                    match outcome {
                        Ok(topics) => {
                            info!("{name}: found {} topics", topics.len());
                            all.extend(topics);
                        }
                        Err(e) => warn!("{name}: failed - {e:#}"),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if in_flight.is_empty() {
                        warn!("{pending} topic source(s) never started");
                        break;
                    }
                    let now = Instant::now();
                    let expired: Vec<usize> = in_flight
                        .iter()
                        .filter(|(_, (_, started))| now >= *started + self.source_timeout)
                        .map(|(id, _)| *id)
                        .collect();
                    for id in expired {
                        if let Some((name, _)) = in_flight.remove(&id) {
                            warn!("{name}: timed out after {:.1}s", self.source_timeout.as_secs_f64());
                            pending -= 1;
                        }
                        if !job_rx.is_empty() {
                            spawn_worker(&job_rx, &event_tx, limit);
                        }
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        rank(dedupe(all), limit)
    }
}

enum WorkerEvent {
    Started {
        id: usize,
        name: String,
        at: Instant,
    },
    Finished {
        id: usize,
        outcome: Result<Vec<TopicCandidate>>,
    },
}

/// Detached worker draining the source queue. One stuck in a hung fetch is
/// simply abandoned.
fn spawn_worker(
    jobs: &Receiver<(usize, Arc<dyn TopicSource>)>,
    events: &Sender<WorkerEvent>,
    limit: usize,
) {
    let jobs = jobs.clone();
    let events = events.clone();
    let spawned = std::thread::Builder::new()
        .name("topic-source".to_string())
        .spawn(move || {
            for (id, source) in jobs.iter() {
                let started = WorkerEvent::Started {
                    id,
                    name: source.name().to_string(),
                    at: Instant::now(),
                };
                if events.send(started).is_err() {
                    break;
                }
                let outcome = source.fetch(limit);
                if events.send(WorkerEvent::Finished { id, outcome }).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to start topic worker: {e}");
    }
}

fn dedup_key(title: &str) -> String {
    title.trim().to_lowercase().chars().take(DEDUP_KEY_CHARS).collect()
}

/// Drop candidates whose normalized title was already seen; first wins.
pub fn dedupe(candidates: Vec<TopicCandidate>) -> Vec<TopicCandidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(dedup_key(&c.title)))
        .collect()
}

/// Stable sort by descending score, then truncate.
pub fn rank(mut candidates: Vec<TopicCandidate>, limit: usize) -> Vec<TopicCandidate> {
    candidates.sort_by(|a, b| b.trending_score.total_cmp(&a.trending_score));
    candidates.truncate(limit);
    candidates
}

pub fn auto_pick_prompt(candidates: &[TopicCandidate]) -> String {
    let menu = candidates
        .iter()
        .take(AUTO_PICK_MENU)
        .enumerate()
        .map(|(i, c)| format!("{}. [{}] {} (score: {:.2})", i + 1, c.source, c.title, c.trending_score))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Pick the single best topic from this list for a viral YouTube Short (60-90 sec).\n\
         Consider: visual potential, broad appeal, timeliness, controversy/surprise factor.\n\n\
         {menu}\n\n\
         Reply with ONLY the topic title text, nothing else."
    )
}

/// Ask the text generator to choose one topic. The trimmed reply is returned
/// as-is; an empty or multi-line reply is rejected.
pub fn auto_pick(candidates: &[TopicCandidate], generator: &dyn TextGenerator) -> Result<String> {
    auto_pick_with(candidates, generator, RetryPolicy::TEXT_GENERATION)
}

pub fn auto_pick_with(
    candidates: &[TopicCandidate],
    generator: &dyn TextGenerator,
    policy: RetryPolicy,
) -> Result<String> {
    if candidates.is_empty() {
        bail!("No topic candidates to pick from");
    }
    let prompt = auto_pick_prompt(candidates);
    let reply = policy.run("auto-pick", || generator.generate(&prompt))?;
    let pick = reply.trim();
    if pick.is_empty() {
        return Err(PipelineError::malformed("auto-pick", "empty reply").into());
    }
    if pick.lines().count() > 1 {
        return Err(PipelineError::malformed("auto-pick", format!("expected one line, got: {pick}")).into());
    }
    Ok(pick.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Hangs;

    impl TopicSource for Hangs {
        fn name(&self) -> &str {
            "hangs"
        }
        fn fetch(&self, _limit: usize) -> Result<Vec<TopicCandidate>> {
            std::thread::sleep(Duration::from_secs(5));
            Ok(vec![TopicCandidate::new("too late", "hangs", 1.0)])
        }
    }

    struct Fails;

    impl TopicSource for Fails {
        fn name(&self) -> &str {
            "fails"
        }
        fn fetch(&self, _limit: usize) -> Result<Vec<TopicCandidate>> {
            bail!("connection refused")
        }
    }

    struct Fixed(&'static str, Vec<TopicCandidate>);

    impl TopicSource for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn fetch(&self, limit: usize) -> Result<Vec<TopicCandidate>> {
            Ok(self.1.iter().take(limit).cloned().collect())
        }
    }

    struct Disabled;

    impl TopicSource for Disabled {
        fn name(&self) -> &str {
            "disabled"
        }
        fn fetch(&self, _limit: usize) -> Result<Vec<TopicCandidate>> {
            panic!("unavailable source must not be fetched")
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    struct Reply(Mutex<Vec<String>>, &'static str);

    impl TextGenerator for Reply {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.0.lock().unwrap().push(prompt.to_string());
            Ok(self.1.to_string())
        }
    }

    fn five() -> Vec<TopicCandidate> {
        (0..5)
            .map(|i| TopicCandidate::new(format!("Topic {i}"), "fixed", 0.1 * i as f64))
            .collect()
    }

    #[test]
    fn hung_and_failing_sources_do_not_block() {
        let engine = TopicEngine::new(vec![
            Arc::new(Hangs),
            Arc::new(Fails),
            Arc::new(Fixed("fixed", five())),
            Arc::new(Disabled),
        ])
        .with_timeout(Duration::from_millis(300));

        let started = Instant::now();
        let topics = engine.discover(15);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0].title, "Topic 4");
        assert!(topics.iter().all(|t| t.source == "fixed"));
    }

    #[test]
    fn queued_source_runs_when_every_worker_hangs() {
        let mut sources: Vec<Arc<dyn TopicSource>> = Vec::new();
        for _ in 0..MAX_WORKERS {
            sources.push(Arc::new(Hangs));
        }
        sources.push(Arc::new(Fixed("queued", five())));
        let engine = TopicEngine::new(sources).with_timeout(Duration::from_millis(200));

        let started = Instant::now();
        let topics = engine.discover(15);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(topics.len(), 5);
        assert_eq!(topics[0].title, "Topic 4");
    }

    #[test]
    fn no_sources_is_empty() {
        assert!(TopicEngine::new(vec![]).discover(10).is_empty());
    }

    #[test]
    fn dedupes_on_normalized_prefix() {
        let long_a = format!("{}A", "x".repeat(50));
        let long_b = format!("{}B", "X".repeat(50));
        let topics = dedupe(vec![
            TopicCandidate::new("  Mars Landing ", "a", 0.2),
            TopicCandidate::new("mars landing", "b", 0.9),
            TopicCandidate::new(long_a, "a", 0.1),
            TopicCandidate::new(long_b, "b", 0.1),
        ]);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].source, "a");
        assert_eq!(topics[0].trending_score, 0.2);
    }

    #[test]
    fn rank_is_stable_and_truncates() {
        let ranked = rank(
            vec![
                TopicCandidate::new("first", "a", 0.5),
                TopicCandidate::new("top", "a", 0.9),
                TopicCandidate::new("second", "b", 0.5),
                TopicCandidate::new("low", "b", 0.1),
            ],
            3,
        );
        let titles: Vec<_> = ranked.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["top", "first", "second"]);
    }

    #[test]
    fn auto_pick_sends_menu_and_trims_reply() {
        let generator = Reply(Mutex::new(Vec::new()), "  Topic 3 \n");
        let candidates: Vec<_> = (0..25)
            .map(|i| TopicCandidate::new(format!("Topic {i}"), "rss/HN", 0.5))
            .collect();
        let pick = auto_pick_with(&candidates, &generator, RetryPolicy::new(0, Duration::ZERO)).unwrap();
        assert_eq!(pick, "Topic 3");

        let prompts = generator.0.lock().unwrap();
        assert!(prompts[0].contains("1. [rss/HN] Topic 0 (score: 0.50)"));
        assert!(prompts[0].contains("20. [rss/HN] Topic 19"));
        assert!(!prompts[0].contains("21."));
    }

    #[test]
    fn auto_pick_rejects_empty_and_multiline() {
        let candidates = five();
        for reply in ["   ", "Topic 1\nTopic 2"] {
            let generator = Reply(Mutex::new(Vec::new()), reply);
            let err = auto_pick_with(&candidates, &generator, RetryPolicy::new(0, Duration::ZERO))
                .unwrap_err();
            assert!(matches!(
                err.downcast_ref::<PipelineError>(),
                Some(PipelineError::MalformedResponse { .. })
            ));
        }
    }

    #[test]
    fn auto_pick_needs_candidates() {
        let generator = Reply(Mutex::new(Vec::new()), "x");
        assert!(auto_pick_with(&[], &generator, RetryPolicy::new(0, Duration::ZERO)).is_err());
    }

    #[test]
    fn registry_defaults() {
        let config = AppConfig::default();
        let engine = TopicEngine::from_config(&config);
        assert_eq!(engine.source_names(), vec!["reddit", "rss", "google_trends"]);

        let config: AppConfig = toml::from_str(
            "[topic_sources.twitter]\nenabled = true\n[topic_sources.reddit]\nenabled = false\n",
        )
        .unwrap();
        let engine = TopicEngine::from_config(&config);
        assert_eq!(engine.source_names(), vec!["rss", "google_trends", "twitter"]);
    }
}
