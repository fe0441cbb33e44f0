//! Stage orchestration: draft, produce and upload a job, resuming from the
//! stage ledger persisted in its job record.

pub mod draft;
mod produce;
mod publish;
#[cfg(test)]
mod resume_tests;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::clients::{
    self, ElevenLabsClient, GeminiImageClient, ImageGenerator, LocalSpeech,
    SpeechSynthesizer, TextGenerator, Transcriber, VideoHost, WhisperCli, YouTubeClient,
};
use crate::config::{resolve_optional_credential, AppConfig, AppPaths};
use crate::error::PipelineError;
use crate::media::{FfmpegAssembler, MediaAssembler};
use crate::research::{self, DuckDuckGo, WebSearch};
use crate::retry::RetryPolicy;
use crate::state::{Artifacts, JobRecord, Stage};

/// The collaborators a job is run against.
pub struct Services {
    pub text: Box<dyn TextGenerator>,
    pub search: Box<dyn WebSearch>,
    /// `None` when no image credential is configured; frames fall back to solid colours.
    pub images: Option<Box<dyn ImageGenerator>>,
    /// Remote TTS, tried before `local_speech`.
    pub speech: Option<Box<dyn SpeechSynthesizer>>,
    pub local_speech: Box<dyn SpeechSynthesizer>,
    pub transcriber: Box<dyn Transcriber>,
    pub media: Box<dyn MediaAssembler>,
    pub host: Box<dyn VideoHost>,
}

impl Services {
    pub fn from_config(config: &AppConfig, paths: &AppPaths) -> Result<Self> {
        let text = clients::llm::from_config(config)?;

        let images: Option<Box<dyn ImageGenerator>> =
            match resolve_optional_credential("GEMINI_API_KEY", config.service_config("gemini"))? {
                Some(key) => Some(Box::new(GeminiImageClient::new(key)?)),
                None => None,
            };

        let speech: Option<Box<dyn SpeechSynthesizer>> = match resolve_optional_credential(
            "ELEVENLABS_API_KEY",
            config.service_config("elevenlabs"),
        )? {
            Some(key) => {
                let voices = ["en", "hi"]
                    .iter()
                    .map(|lang| (lang.to_string(), config.voice_id(lang)))
                    .collect();
                Some(Box::new(ElevenLabsClient::new(key, voices)?))
            }
            None => None,
        };

        Ok(Self {
            text,
            search: Box::new(DuckDuckGo::new()?),
            images,
            speech,
            local_speech: Box::new(LocalSpeech::new(config.local_speech_command())),
            transcriber: Box::new(WhisperCli::default()),
            media: Box::new(FfmpegAssembler::default()),
            host: Box::new(YouTubeClient::new(paths.youtube_token_path(config))?),
        })
    }
}

/// Backoff for each kind of remote call.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicies {
    pub text: RetryPolicy,
    pub research: RetryPolicy,
    pub speech: RetryPolicy,
    pub image: RetryPolicy,
    pub upload: RetryPolicy,
}

impl Default for RetryPolicies {
    fn default() -> Self {
        Self {
            text: RetryPolicy::TEXT_GENERATION,
            research: RetryPolicy::RESEARCH,
            speech: RetryPolicy::SPEECH,
            image: RetryPolicy::IMAGE,
            upload: RetryPolicy::UPLOAD,
        }
    }
}

impl RetryPolicies {
    /// Single attempt everywhere.
    pub fn none() -> Self {
        let once = RetryPolicy::new(0, std::time::Duration::ZERO);
        Self {
            text: once,
            research: once,
            speech: once,
            image: once,
            upload: once,
        }
    }
}

/// Which stages of a command run again even when already done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rerun {
    /// Every stage of the command.
    pub force: bool,
    /// This stage and all later ones.
    pub from: Option<Stage>,
}

impl Rerun {
    pub fn applies_to(&self, stage: Stage) -> bool {
        self.force || self.from.is_some_and(|from| stage >= from)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProduceOptions {
    pub lang: String,
    /// Narrate this instead of the draft's script.
    pub script: Option<String>,
    pub rerun: Rerun,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub lang: String,
    pub rerun: Rerun,
}

/// Outcome of a full `run`.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub draft_path: PathBuf,
    pub video: Option<PathBuf>,
    pub url: Option<String>,
}

/// True when `stage` is done and, for language-scoped stages, was done for `lang`.
pub fn stage_done_for(job: &JobRecord, stage: Stage, lang: &str) -> bool {
    if !job.ledger.is_done(stage) {
        return false;
    }
    !stage.is_language_scoped()
        || job.ledger.artifact::<String>(stage, "lang").as_deref() == Some(lang)
}

/// Run one stage against the ledger.
///
/// A stage already done for `lang` is skipped and its recorded artifacts
/// returned, unless `rerun` is set. Otherwise `exec` runs; success records the
/// artifacts, failure records the error. The record is saved to `path` after
/// either transition and a failure is returned to the caller.
pub fn run_stage<F>(
    job: &mut JobRecord,
    path: &Path,
    stage: Stage,
    lang: &str,
    rerun: bool,
    exec: F,
) -> Result<Artifacts>
where
    F: FnOnce(&mut JobRecord) -> Result<Artifacts>,
{
    if !rerun && stage_done_for(job, stage, lang) {
        info!("Skipping {stage} (already done)");
        return Ok(job.ledger.artifacts(stage).cloned().unwrap_or_default());
    }

    info!("Stage: {stage}");
    match exec(job) {
        Ok(mut artifacts) => {
            if stage.is_language_scoped() {
                artifacts.insert("lang".to_string(), lang.into());
            }
            job.ledger.complete(stage, Some(artifacts.clone()));
            job.save(path)?;
            Ok(artifacts)
        }
        Err(e) => {
            job.ledger.fail(stage, format!("{e:#}"));
            if let Err(save_err) = job.save(path) {
                warn!("Could not record {stage} failure: {save_err:#}");
            }
            Err(e)
        }
    }
}

/// Required artifact, typed.
pub fn required<T: DeserializeOwned>(artifacts: &Artifacts, stage: Stage, key: &str) -> Result<T> {
    artifacts
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .ok_or_else(|| {
            PipelineError::MissingArtifact {
                stage,
                key: key.to_string(),
            }
            .into()
        })
}

/// Optional artifact; absent, null or mistyped values read as `None`.
pub fn optional<T: DeserializeOwned>(artifacts: &Artifacts, key: &str) -> Option<T> {
    artifacts
        .get(key)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

pub fn artifacts<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> Artifacts {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

pub struct Orchestrator {
    paths: AppPaths,
    services: Services,
    retry: RetryPolicies,
}

impl Orchestrator {
    pub fn new(paths: AppPaths, services: Services) -> Self {
        Self {
            paths,
            services,
            retry: RetryPolicies::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn text_generator(&self) -> &dyn TextGenerator {
        self.services.text.as_ref()
    }

    /// Research the topic and generate a script for a new job. Returns the
    /// saved record and where it lives.
    pub fn draft(&self, news: &str, context: &str) -> Result<(PathBuf, JobRecord)> {
        let mut job = JobRecord::new(JobRecord::new_job_id(), news.trim(), context.trim());
        let path = self.paths.draft_path(&job.job_id);
        info!("Drafting job {}: {}", job.job_id, job.news);
        self.draft_stages(&mut job, &path, &Rerun::default())?;
        Ok((path, job))
    }

    /// Redo the draft stages of an existing record.
    pub fn redraft(&self, path: &Path, rerun: &Rerun) -> Result<JobRecord> {
        let mut job = JobRecord::load(path)?;
        self.draft_stages(&mut job, path, rerun)?;
        Ok(job)
    }

    fn draft_stages(&self, job: &mut JobRecord, path: &Path, rerun: &Rerun) -> Result<()> {
        job.save(path)?;

        run_stage(job, path, Stage::Research, "", rerun.applies_to(Stage::Research), |job| {
            job.research = research::research_with(
                self.services.search.as_ref(),
                &job.news,
                self.retry.research,
            );
            Ok(Artifacts::new())
        })?;

        run_stage(job, path, Stage::Draft, "", rerun.applies_to(Stage::Draft), |job| {
            let prompt = draft::draft_prompt(&job.news, &job.context, &job.research);
            let reply = self
                .retry
                .text
                .run("script generation", || self.services.text.generate(&prompt))?;
            draft::parse_draft_response(&reply)?.apply_to(job);
            Ok(Artifacts::new())
        })?;

        info!("Draft saved: {}", path.display());
        Ok(())
    }

    /// Render the video for one language. Returns the video path.
    pub fn produce(&self, path: &Path, opts: &ProduceOptions) -> Result<PathBuf> {
        let mut job = JobRecord::load(path)?;
        produce::run(self, &mut job, path, opts)
    }

    /// Publish a produced video. Returns its URL.
    pub fn upload(&self, path: &Path, opts: &UploadOptions) -> Result<String> {
        let mut job = JobRecord::load(path)?;
        publish::run(self, &mut job, path, opts)
    }

    /// Draft, then (unless `dry_run`) produce and upload in `lang`.
    pub fn run(&self, news: &str, context: &str, lang: &str, dry_run: bool) -> Result<RunReport> {
        let (draft_path, _) = self.draft(news, context)?;
        if dry_run {
            info!("Dry run - skipping produce and upload");
            return Ok(RunReport {
                draft_path,
                video: None,
                url: None,
            });
        }

        let video = self
            .produce(
                &draft_path,
                &ProduceOptions {
                    lang: lang.to_string(),
                    ..Default::default()
                },
            )
            .with_context(|| format!("Produce failed; resume with --draft {}", draft_path.display()))?;
        let url = self
            .upload(
                &draft_path,
                &UploadOptions {
                    lang: lang.to_string(),
                    ..Default::default()
                },
            )
            .with_context(|| format!("Upload failed; resume with --draft {}", draft_path.display()))?;

        Ok(RunReport {
            draft_path,
            video: Some(video),
            url: Some(url),
        })
    }
}
