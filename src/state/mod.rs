pub mod job;
pub mod ledger;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use job::{JobRecord, LanguageOutputs, SCHEMA_VERSION};
pub use ledger::{Artifacts, StageEntry, StageLedger, StageStatus};

/// Pipeline stages in execution order. The derived `Ord` follows this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Research,
    Draft,
    Broll,
    Voiceover,
    Whisper,
    Captions,
    Music,
    Assemble,
    Thumbnail,
    Upload,
}

impl Stage {
    pub const ALL: [Stage; 10] = [
        Stage::Research,
        Stage::Draft,
        Stage::Broll,
        Stage::Voiceover,
        Stage::Whisper,
        Stage::Captions,
        Stage::Music,
        Stage::Assemble,
        Stage::Thumbnail,
        Stage::Upload,
    ];

    pub const DRAFT: [Stage; 2] = [Stage::Research, Stage::Draft];

    pub const PRODUCE: [Stage; 6] = [
        Stage::Broll,
        Stage::Voiceover,
        Stage::Whisper,
        Stage::Captions,
        Stage::Music,
        Stage::Assemble,
    ];

    pub const UPLOAD: [Stage; 2] = [Stage::Thumbnail, Stage::Upload];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Research => "research",
            Stage::Draft => "draft",
            Stage::Broll => "broll",
            Stage::Voiceover => "voiceover",
            Stage::Whisper => "whisper",
            Stage::Captions => "captions",
            Stage::Music => "music",
            Stage::Assemble => "assemble",
            Stage::Thumbnail => "thumbnail",
            Stage::Upload => "upload",
        }
    }

    /// Stages whose artifacts belong to one output language.
    pub fn is_language_scoped(&self) -> bool {
        !matches!(self, Stage::Research | Stage::Draft)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                let names: Vec<&str> = Stage::ALL.iter().map(|s| s.as_str()).collect();
                format!("unknown stage `{s}` (expected one of: {})", names.join(", "))
            })
    }
}
