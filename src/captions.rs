//! Word-timestamp captions: SRT for the upload track, ASS with per-word
//! highlighting for burn-in.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;
use tracing::info;

pub const DEFAULT_GROUP_SIZE: usize = 4;

/// One transcribed word with its timing in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordTimestamp {
    pub word: String,
    pub start: f64,
    pub end: f64,
}

impl WordTimestamp {
    pub fn new(word: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            word: word.into(),
            start,
            end,
        }
    }
}

/// Split words into display groups of `group_size`; the last group takes the remainder.
pub fn group_words(words: &[WordTimestamp], group_size: usize) -> Vec<&[WordTimestamp]> {
    words.chunks(group_size.max(1)).collect()
}

/// `HH:MM:SS,mmm`
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// `H:MM:SS.cc`
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).round() as u64;
    let h = total_cs / 360_000;
    let m = (total_cs % 360_000) / 6000;
    let s = (total_cs % 6000) / 100;
    let cs = total_cs % 100;
    format!("{h}:{m:02}:{s:02}.{cs:02}")
}

/// One SRT cue per group.
pub fn render_srt(words: &[WordTimestamp], group_size: usize) -> String {
    group_words(words, group_size)
        .iter()
        .enumerate()
        .map(|(i, group)| {
            let text: Vec<&str> = group.iter().map(|w| w.word.as_str()).collect();
            format!(
                "{}\n{} --> {}\n{}\n",
                i + 1,
                format_srt_time(group[0].start),
                format_srt_time(group[group.len() - 1].end),
                text.join(" ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// ASS dialogue events: one per word, each showing its whole group with the
/// active word emphasised.
pub fn ass_events(words: &[WordTimestamp], group_size: usize) -> Vec<String> {
    let mut events = Vec::with_capacity(words.len());
    for group in group_words(words, group_size) {
        for (active, word) in group.iter().enumerate() {
            let text = group
                .iter()
                .enumerate()
                .map(|(j, w)| {
                    if j == active {
                        format!("{{\\c&H00FFFF&\\b1\\fs80}}{}{{\\r}}", w.word)
                    } else {
                        w.word.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            events.push(format!(
                "Dialogue: 0,{},{},Default,,0,0,0,,{}",
                format_ass_time(word.start),
                format_ass_time(word.end),
                text
            ));
        }
    }
    events
}

fn ass_header(width: u32, height: u32) -> String {
    // bottom margin puts the text roughly 75% of the way down
    let margin_v = height / 4;
    let mut header = String::new();
    let _ = writeln!(header, "[Script Info]");
    let _ = writeln!(header, "Title: Shortreel Captions");
    let _ = writeln!(header, "ScriptType: v4.00+");
    let _ = writeln!(header, "PlayResX: {width}");
    let _ = writeln!(header, "PlayResY: {height}");
    let _ = writeln!(header, "WrapStyle: 0");
    let _ = writeln!(header);
    let _ = writeln!(header, "[V4+ Styles]");
    let _ = writeln!(header, "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding");
    let _ = writeln!(header, "Style: Default,Arial,72,&H00FFFFFF,&H000000FF,&H00000000,&H80000000,-1,0,0,0,100,100,0,0,3,3,0,2,40,40,{margin_v},1");
    let _ = writeln!(header);
    let _ = writeln!(header, "[Events]");
    let _ = writeln!(header, "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text");
    header
}

/// Full ASS document for a `width`x`height` video.
pub fn render_ass(words: &[WordTimestamp], group_size: usize, width: u32, height: u32) -> String {
    let mut doc = ass_header(width, height);
    doc.push_str(&ass_events(words, group_size).join("\n"));
    doc
}

/// Paths of caption files written for one language.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptionFiles {
    pub srt: Option<std::path::PathBuf>,
    pub ass: Option<std::path::PathBuf>,
}

/// Write `captions_<lang>.srt` and `captions_<lang>.ass` into `work_dir`.
/// Writes nothing for an empty word list.
pub fn write_captions(
    words: &[WordTimestamp],
    work_dir: &Path,
    lang: &str,
    width: u32,
    height: u32,
) -> Result<CaptionFiles> {
    if words.is_empty() {
        return Ok(CaptionFiles::default());
    }

    let srt_path = work_dir.join(format!("captions_{lang}.srt"));
    std::fs::write(&srt_path, render_srt(words, DEFAULT_GROUP_SIZE))
        .with_context(|| format!("Failed to write {}", srt_path.display()))?;
    info!("SRT captions saved: {}", srt_path.display());

    let ass_path = work_dir.join(format!("captions_{lang}.ass"));
    std::fs::write(&ass_path, render_ass(words, DEFAULT_GROUP_SIZE, width, height))
        .with_context(|| format!("Failed to write {}", ass_path.display()))?;
    info!("ASS captions saved: {}", ass_path.display());

    Ok(CaptionFiles {
        srt: Some(srt_path),
        ass: Some(ass_path),
    })
}

/// Load word timestamps persisted by the whisper stage.
pub fn load_words(path: &Path) -> Result<Vec<WordTimestamp>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read word timestamps: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse word timestamps: {}", path.display()))
}

pub fn save_words(words: &[WordTimestamp], path: &Path) -> Result<()> {
    let json = serde_json::to_string(words)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write word timestamps: {}", path.display()))
}
