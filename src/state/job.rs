use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use super::StageLedger;
use crate::error::PipelineError;

pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Finished outputs for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageOutputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srt: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub youtube_url: Option<String>,
}

/// The persisted job document: generated payload plus the embedded stage ledger.
///
/// Saved as a whole after every stage transition; last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub job_id: String,
    pub created_at: DateTime<Utc>,
    pub news: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context: String,
    #[serde(default)]
    pub research: String,
    #[serde(default)]
    pub script: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_hi: Option<String>,
    #[serde(default)]
    pub broll_prompts: Vec<String>,
    #[serde(default)]
    pub youtube_title: String,
    #[serde(default)]
    pub youtube_description: String,
    #[serde(default)]
    pub youtube_tags: String,
    #[serde(default)]
    pub instagram_caption: String,
    #[serde(default)]
    pub thumbnail_prompt: String,
    #[serde(default)]
    pub outputs: BTreeMap<String, LanguageOutputs>,
    #[serde(rename = "_pipeline_state", default)]
    pub ledger: StageLedger,
}

impl JobRecord {
    pub fn new(job_id: impl Into<String>, news: impl Into<String>, context: impl Into<String>) -> Self {
        JobRecord {
            schema_version: SCHEMA_VERSION,
            job_id: job_id.into(),
            created_at: Utc::now(),
            news: news.into(),
            context: context.into(),
            research: String::new(),
            script: String::new(),
            script_hi: None,
            broll_prompts: Vec::new(),
            youtube_title: String::new(),
            youtube_description: String::new(),
            youtube_tags: String::new(),
            instagram_caption: String::new(),
            thumbnail_prompt: String::new(),
            outputs: BTreeMap::new(),
            ledger: StageLedger::new(),
        }
    }

    /// Job ids are the creation time in Unix seconds.
    pub fn new_job_id() -> String {
        Utc::now().timestamp().to_string()
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read draft: {}", path.display()))?;
        let record: JobRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse draft: {}", path.display()))?;
        if record.schema_version > SCHEMA_VERSION {
            return Err(PipelineError::UnsupportedSchema {
                found: record.schema_version,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        Ok(record)
    }

    /// Rewrite the whole document. Goes through a sibling temp file so a crash
    /// never leaves a half-written record behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write draft: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace draft: {}", path.display()))?;
        Ok(())
    }

    /// Script for a language; Hindi falls back to the English script when absent.
    pub fn script_for(&self, lang: &str) -> &str {
        match (lang, self.script_hi.as_deref()) {
            ("hi", Some(hi)) if !hi.trim().is_empty() => hi,
            _ => &self.script,
        }
    }

    pub fn title(&self) -> &str {
        if self.youtube_title.trim().is_empty() {
            &self.news
        } else {
            &self.youtube_title
        }
    }

    pub fn outputs(&self, lang: &str) -> Option<&LanguageOutputs> {
        self.outputs.get(lang)
    }

    pub fn outputs_mut(&mut self, lang: &str) -> &mut LanguageOutputs {
        self.outputs.entry(lang.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Artifacts, Stage};
    use serde_json::json;

    fn sample() -> JobRecord {
        let mut record = JobRecord::new("1760000000", "India wins VCT Pacific 2026", "");
        record.script = "Huge upset tonight.".into();
        record.broll_prompts = vec!["stadium lights".into(), "trophy".into()];
        record.youtube_title = "India takes Pacific".into();

        let mut frames = Artifacts::new();
        frames.insert("frames".into(), json!(["/m/broll_0.png", "/m/broll_1.png"]));
        frames.insert("lang".into(), json!("en"));
        record.ledger.complete(Stage::Research, None);
        record.ledger.complete(Stage::Broll, Some(frames));
        record.ledger.fail(Stage::Voiceover, "ElevenLabs 401: unauthorized");
        record
    }

    #[test]
    fn round_trips_with_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drafts").join("1760000000.json");
        let record = sample();
        record.save(&path).unwrap();

        let loaded = JobRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
        for stage in Stage::ALL {
            assert_eq!(loaded.ledger.is_done(stage), record.ledger.is_done(stage));
            assert_eq!(loaded.ledger.is_failed(stage), record.ledger.is_failed(stage));
        }
        let frames: Vec<String> = loaded.ledger.artifact_or(Stage::Broll, "frames", Vec::new());
        assert_eq!(frames, vec!["/m/broll_0.png", "/m/broll_1.png"]);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn ledger_is_embedded_under_pipeline_state() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["_pipeline_state"]["broll"]["status"], "done");
        assert_eq!(value["_pipeline_state"]["voiceover"]["status"], "failed");
        assert_eq!(value["schema_version"], 1);
    }

    #[test]
    fn rejects_newer_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        let mut value = serde_json::to_value(sample()).unwrap();
        value["schema_version"] = json!(SCHEMA_VERSION + 1);
        std::fs::write(&path, value.to_string()).unwrap();

        let err = JobRecord::load(&path).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn minimal_document_loads_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{"job_id": "1", "created_at": "2026-10-18T10:00:00Z", "news": "topic"}"#,
        )
        .unwrap();
        let record = JobRecord::load(&path).unwrap();
        assert_eq!(record.schema_version, SCHEMA_VERSION);
        assert!(!record.ledger.is_done(Stage::Research));
        assert_eq!(record.title(), "topic");
    }

    #[test]
    fn hindi_script_falls_back_to_english() {
        let mut record = sample();
        assert_eq!(record.script_for("hi"), "Huge upset tonight.");
        record.script_hi = Some("आज रात बड़ा उलटफेर".into());
        assert_eq!(record.script_for("hi"), "आज रात बड़ा उलटफेर");
        assert_eq!(record.script_for("en"), "Huge upset tonight.");
    }
}
