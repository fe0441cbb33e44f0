use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Stage;

/// Values a completed stage hands to later stages (file paths, filter expressions, ...).
pub type Artifacts = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEntry {
    pub status: StageStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<Artifacts>,
}

/// Per-stage completion record embedded in a job record.
///
/// A stage missing from the map is pending. There is no running state: a crash
/// mid-stage leaves the stage pending and it is redone from scratch on resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageLedger {
    entries: BTreeMap<Stage, StageEntry>,
}

impl StageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, stage: Stage) -> Option<StageStatus> {
        self.entries.get(&stage).map(|e| e.status)
    }

    pub fn is_done(&self, stage: Stage) -> bool {
        self.status(stage) == Some(StageStatus::Done)
    }

    pub fn is_failed(&self, stage: Stage) -> bool {
        self.status(stage) == Some(StageStatus::Failed)
    }

    pub fn entry(&self, stage: Stage) -> Option<&StageEntry> {
        self.entries.get(&stage)
    }

    /// Mark a stage done, replacing whatever was recorded before.
    pub fn complete(&mut self, stage: Stage, artifacts: Option<Artifacts>) {
        self.entries.insert(
            stage,
            StageEntry {
                status: StageStatus::Done,
                timestamp: Utc::now(),
                error: None,
                artifacts: artifacts.filter(|a| !a.is_empty()),
            },
        );
    }

    /// Mark a stage failed. Prior artifacts are dropped.
    pub fn fail(&mut self, stage: Stage, error: impl Into<String>) {
        self.entries.insert(
            stage,
            StageEntry {
                status: StageStatus::Failed,
                timestamp: Utc::now(),
                error: Some(error.into()),
                artifacts: None,
            },
        );
    }

    /// Artifacts of a completed stage. Failed or pending stages have none.
    pub fn artifacts(&self, stage: Stage) -> Option<&Artifacts> {
        self.entries
            .get(&stage)
            .filter(|e| e.status == StageStatus::Done)
            .and_then(|e| e.artifacts.as_ref())
    }

    /// Typed read of one artifact. `None` when the stage is not done, the key is
    /// absent, or the value does not deserialize as `T`.
    pub fn artifact<T: DeserializeOwned>(&self, stage: Stage, key: &str) -> Option<T> {
        self.artifacts(stage)
            .and_then(|a| a.get(key))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn artifact_or<T: DeserializeOwned>(&self, stage: Stage, key: &str, default: T) -> T {
        self.artifact(stage, key).unwrap_or(default)
    }

    /// Forget every stage (forced full re-run).
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// One line per stage: `[+]` done, `[!]` failed, `[ ]` pending.
    pub fn summary(&self) -> String {
        Stage::ALL
            .iter()
            .map(|stage| {
                let marker = match self.status(*stage) {
                    Some(StageStatus::Done) => '+',
                    Some(StageStatus::Failed) => '!',
                    None => ' ',
                };
                format!("  [{marker}] {stage}")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
