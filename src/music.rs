//! Background music: track selection, speech regions, and the ducking filter.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::captions::WordTimestamp;

pub const SPEECH_GAP_SECS: f64 = 0.5;
pub const DUCK_BUFFER_SECS: f64 = 0.3;
pub const SPEECH_GAIN: f64 = 0.12;
pub const BACKGROUND_GAIN: f64 = 0.25;

/// A merged stretch of continuous speech, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechRegion {
    pub start: f64,
    pub end: f64,
}

impl SpeechRegion {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

/// Merge words into regions; a word starting less than `max_gap` after the
/// previous end extends the current region.
pub fn speech_regions(words: &[WordTimestamp], max_gap: f64) -> Vec<SpeechRegion> {
    let mut regions: Vec<SpeechRegion> = Vec::new();
    for w in words {
        match regions.last_mut() {
            Some(current) if w.start - current.end < max_gap => {
                current.end = current.end.max(w.end);
            }
            _ => regions.push(SpeechRegion::new(w.start, w.end)),
        }
    }
    regions
}

/// ffmpeg `volume` filter that drops music to 0.12 around speech and keeps it at
/// 0.25 otherwise. Evaluated per frame.
pub fn build_duck_filter(regions: &[SpeechRegion], buffer: f64) -> String {
    if regions.is_empty() {
        return format!("volume={BACKGROUND_GAIN}");
    }

    let conditions: Vec<String> = regions
        .iter()
        .map(|r| {
            let start = (r.start - buffer).max(0.0);
            let end = r.end + buffer;
            format!("between(t,{start:.2},{end:.2})")
        })
        .collect();

    format!(
        "volume='if({}, {SPEECH_GAIN}, {BACKGROUND_GAIN})':eval=frame",
        conditions.join("+")
    )
}

/// All `*.mp3` files in the music directory, sorted.
pub fn find_tracks(music_dir: &Path) -> Result<Vec<PathBuf>> {
    if !music_dir.is_dir() {
        return Ok(Vec::new());
    }
    let pattern = music_dir.join("*.mp3");
    let pattern = pattern.to_string_lossy();
    let mut tracks: Vec<PathBuf> = glob::glob(&pattern)
        .with_context(|| format!("Invalid music glob: {pattern}"))?
        .filter_map(|r| r.ok())
        .filter(|p| p.is_file())
        .collect();
    tracks.sort();
    Ok(tracks)
}

/// Pick a track for a job. The choice is stable for a job id so a re-run of the
/// music stage picks the same track.
pub fn select_track<'a>(tracks: &'a [PathBuf], job_id: &str) -> Option<&'a PathBuf> {
    if tracks.is_empty() {
        return None;
    }
    let seed = job_id
        .parse::<u64>()
        .unwrap_or_else(|_| job_id.bytes().map(u64::from).sum());
    tracks.get((seed % tracks.len() as u64) as usize)
}
