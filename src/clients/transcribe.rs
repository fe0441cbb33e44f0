use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;

use crate::captions::WordTimestamp;
use crate::media::run_tool;

/// Speech-to-text with per-word timing.
pub trait Transcriber {
    fn word_timestamps(&self, audio: &Path, lang: &str, out_dir: &Path) -> Result<Vec<WordTimestamp>>;

    /// Sentence-level SRT, used when no word timing is available.
    fn srt_fallback(&self, audio: &Path, lang: &str, out_dir: &Path) -> Result<Option<PathBuf>>;
}

/// The openai-whisper command line tool.
pub struct WhisperCli {
    pub program: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for WhisperCli {
    fn default() -> Self {
        Self {
            program: "whisper".to_string(),
            model: "base".to_string(),
            timeout: Duration::from_secs(900),
        }
    }
}

#[derive(Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    segments: Vec<Segment>,
}

#[derive(Deserialize)]
struct Segment {
    #[serde(default)]
    words: Vec<RawWord>,
}

#[derive(Deserialize)]
struct RawWord {
    word: String,
    start: f64,
    end: f64,
}

pub fn parse_whisper_json(json: &str) -> Result<Vec<WordTimestamp>> {
    let output: WhisperOutput =
        serde_json::from_str(json).context("Failed to parse whisper JSON output")?;
    Ok(output
        .segments
        .into_iter()
        .flat_map(|s| s.words)
        .map(|w| WordTimestamp::new(w.word.trim(), w.start, w.end))
        .filter(|w| !w.word.is_empty())
        .collect())
}

impl WhisperCli {
    fn command(&self, audio: &Path, lang: &str, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(audio)
            .args(["--model", &self.model])
            .args(["--language", language_code(lang)])
            .arg("--output_dir")
            .arg(out_dir);
        cmd
    }

    fn output_file(audio: &Path, out_dir: &Path, ext: &str) -> PathBuf {
        let stem = audio
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        out_dir.join(format!("{stem}.{ext}"))
    }
}

fn language_code(lang: &str) -> &str {
    lang.get(..2).unwrap_or(lang)
}

impl Transcriber for WhisperCli {
    fn word_timestamps(&self, audio: &Path, lang: &str, out_dir: &Path) -> Result<Vec<WordTimestamp>> {
        info!("Running Whisper for word-level timestamps...");
        let mut cmd = self.command(audio, lang, out_dir);
        cmd.args(["--word_timestamps", "True", "--output_format", "json"]);
        run_tool(cmd, self.timeout)?;

        let json_path = Self::output_file(audio, out_dir, "json");
        let json = std::fs::read_to_string(&json_path)
            .with_context(|| format!("Failed to read {}", json_path.display()))?;
        let words = parse_whisper_json(&json)?;
        info!("Got {} word timestamps.", words.len());
        Ok(words)
    }

    fn srt_fallback(&self, audio: &Path, lang: &str, out_dir: &Path) -> Result<Option<PathBuf>> {
        let mut cmd = self.command(audio, lang, out_dir);
        cmd.args(["--output_format", "srt"]);
        run_tool(cmd, self.timeout)?;
        let srt = Self::output_file(audio, out_dir, "srt");
        Ok(srt.exists().then_some(srt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_segment_words() {
        let json = r#"{
            "text": " Big news today. Really.",
            "segments": [
                {"id": 0, "words": [
                    {"word": " Big", "start": 0.0, "end": 0.3, "probability": 0.9},
                    {"word": " news", "start": 0.3, "end": 0.6}
                ]},
                {"id": 1},
                {"id": 2, "words": [{"word": "  ", "start": 1.0, "end": 1.1},
                                     {"word": " Really.", "start": 1.2, "end": 1.6}]}
            ]
        }"#;
        let words = parse_whisper_json(json).unwrap();
        assert_eq!(
            words,
            vec![
                WordTimestamp::new("Big", 0.0, 0.3),
                WordTimestamp::new("news", 0.3, 0.6),
                WordTimestamp::new("Really.", 1.2, 1.6),
            ]
        );
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_whisper_json("not json").is_err());
    }

    #[test]
    fn output_file_uses_audio_stem() {
        assert_eq!(
            WhisperCli::output_file(Path::new("/w/voiceover_en.mp3"), Path::new("/w"), "json"),
            PathBuf::from("/w/voiceover_en.json")
        );
    }

    #[test]
    fn two_letter_language() {
        assert_eq!(language_code("en-US"), "en");
        assert_eq!(language_code("hi"), "hi");
        assert_eq!(language_code("x"), "x");
    }
}
