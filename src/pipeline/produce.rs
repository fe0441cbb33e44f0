use anyhow::{anyhow, bail, Context, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{artifacts, draft, optional, required, Orchestrator, ProduceOptions};
use crate::captions::{self, WordTimestamp};
use crate::config::{VIDEO_HEIGHT, VIDEO_WIDTH};
use crate::media::{frames, AssemblyRequest};
use crate::music::{self, SpeechRegion};
use crate::state::{JobRecord, Stage};

const FALLBACK_MUSIC_SECS: f64 = 60.0;

pub(super) fn run(
    orch: &Orchestrator,
    job: &mut JobRecord,
    path: &Path,
    opts: &ProduceOptions,
) -> Result<PathBuf> {
    let lang = opts.lang.as_str();
    let rerun = &opts.rerun;
    let media_dir = orch.paths.media_dir();
    let work_dir = orch.paths.work_dir(&job.job_id, lang);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create {}", work_dir.display()))?;

    let script = opts
        .script
        .clone()
        .unwrap_or_else(|| job.script_for(lang).to_string());
    if script.trim().is_empty() {
        bail!("Draft {} has no script; run draft first", path.display());
    }
    info!("Producing {} video for job {}", lang.to_uppercase(), job.job_id);

    let broll = super::run_stage(job, path, Stage::Broll, lang, rerun.applies_to(Stage::Broll), |job| {
        let frames = orch.generate_broll(&job.broll_prompts, &work_dir)?;
        Ok(artifacts([("frames", json!(frames))]))
    })?;
    let frames: Vec<PathBuf> = required(&broll, Stage::Broll, "frames")?;

    let voiceover = super::run_stage(job, path, Stage::Voiceover, lang, rerun.applies_to(Stage::Voiceover), |_| {
        let audio = orch.synthesize_voiceover(&script, lang, &work_dir)?;
        Ok(artifacts([("path", json!(audio))]))
    })?;
    let voiceover: PathBuf = required(&voiceover, Stage::Voiceover, "path")?;

    let whisper = super::run_stage(job, path, Stage::Whisper, lang, rerun.applies_to(Stage::Whisper), |_| {
        let words = match orch
            .services
            .transcriber
            .word_timestamps(&voiceover, lang, &work_dir)
        {
            Ok(words) => words,
            Err(e) => {
                warn!("Word timestamps unavailable: {e:#}");
                Vec::new()
            }
        };
        let words_path = work_dir.join(format!("words_{lang}.json"));
        captions::save_words(&words, &words_path)?;
        Ok(artifacts([
            ("words_path", json!(words_path)),
            ("word_count", json!(words.len())),
        ]))
    })?;
    let words = load_recorded_words(optional::<PathBuf>(&whisper, "words_path"));

    let caption_files = super::run_stage(job, path, Stage::Captions, lang, rerun.applies_to(Stage::Captions), |_| {
        let files = captions::write_captions(&words, &work_dir, lang, VIDEO_WIDTH, VIDEO_HEIGHT)?;
        let srt = match files.srt {
            Some(srt) => Some(srt),
            None => {
                info!("No word timestamps - falling back to sentence-level SRT");
                orch.services
                    .transcriber
                    .srt_fallback(&voiceover, lang, &work_dir)
                    .unwrap_or_else(|e| {
                        warn!("SRT fallback failed: {e:#}");
                        None
                    })
            }
        };
        Ok(artifacts([("srt_path", json!(srt)), ("ass_path", json!(files.ass))]))
    })?;
    let srt: Option<PathBuf> = optional(&caption_files, "srt_path");
    let ass: Option<PathBuf> = optional(&caption_files, "ass_path");

    let music = super::run_stage(job, path, Stage::Music, lang, rerun.applies_to(Stage::Music), |job| {
        let tracks = music::find_tracks(&orch.paths.music_dir())?;
        let Some(track) = music::select_track(&tracks, &job.job_id) else {
            info!("No music tracks in {} - skipping music", orch.paths.music_dir().display());
            return Ok(artifacts([]));
        };
        let regions = orch.speech_regions(&words, &voiceover);
        let duck = music::build_duck_filter(&regions, music::DUCK_BUFFER_SECS);
        info!("Music: {}", track.display());
        Ok(artifacts([("track_path", json!(track)), ("duck_filter", json!(duck))]))
    })?;
    let track: Option<PathBuf> = optional(&music, "track_path");
    let duck_filter: Option<String> = optional(&music, "duck_filter");

    let assembled = super::run_stage(job, path, Stage::Assemble, lang, rerun.applies_to(Stage::Assemble), |job| {
        let request = AssemblyRequest {
            frames: frames.clone(),
            voiceover: voiceover.clone(),
            work_dir: work_dir.clone(),
            output: media_dir.join(format!("pipeline_{}_{lang}.mp4", job.job_id)),
            captions: ass.clone(),
            music: track.clone(),
            duck_filter: duck_filter.clone(),
        };
        let video = orch.services.media.assemble(&request)?;
        Ok(artifacts([("video_path", json!(video))]))
    })?;
    let video: PathBuf = required(&assembled, Stage::Assemble, "video_path")?;

    let final_srt = match srt.filter(|p| p.exists()) {
        Some(srt) => {
            let dest = media_dir.join(format!("pipeline_{}_{lang}.srt", job.job_id));
            std::fs::copy(&srt, &dest)
                .with_context(|| format!("Failed to copy captions to {}", dest.display()))?;
            Some(dest)
        }
        None => None,
    };
    let outputs = job.outputs_mut(lang);
    outputs.video = Some(video.clone());
    if final_srt.is_some() {
        outputs.srt = final_srt;
    }
    job.save(path)?;

    info!("Video: {}", video.display());
    Ok(video)
}

fn load_recorded_words(path: Option<PathBuf>) -> Vec<WordTimestamp> {
    let Some(path) = path.filter(|p| p.exists()) else {
        return Vec::new();
    };
    captions::load_words(&path).unwrap_or_else(|e| {
        warn!("{e:#}");
        Vec::new()
    })
}

impl Orchestrator {
    /// One frame per prompt (at most three). A prompt that cannot be rendered
    /// gets a solid-colour frame instead.
    fn generate_broll(&self, prompts: &[String], work_dir: &Path) -> Result<Vec<PathBuf>> {
        let prompts = draft::broll_prompts_or_default(prompts);
        let total = prompts.len();
        let mut out = Vec::with_capacity(total);

        for (i, prompt) in prompts.iter().enumerate() {
            info!("Generating b-roll frame {}/{total}...", i + 1);
            let rendered = match &self.services.images {
                Some(images) => self
                    .retry
                    .image
                    .run("image generation", || images.generate_image(prompt))
                    .and_then(|bytes| frames::fit_cover(&bytes, VIDEO_WIDTH, VIDEO_HEIGHT)),
                None => Err(anyhow!("no image generator configured (GEMINI_API_KEY)")),
            };
            let image = rendered.unwrap_or_else(|e| {
                warn!("Frame {} failed: {e:#} - using fallback", i + 1);
                frames::fallback_frame(i, VIDEO_WIDTH, VIDEO_HEIGHT)
            });
            let frame_path = work_dir.join(format!("broll_{i}.png"));
            frames::save_png(&image, &frame_path)?;
            out.push(frame_path);
        }
        Ok(out)
    }

    /// Remote TTS with retries, then the local speech command.
    fn synthesize_voiceover(&self, script: &str, lang: &str, work_dir: &Path) -> Result<PathBuf> {
        match &self.services.speech {
            Some(remote) => {
                info!("Generating {lang} voiceover...");
                match self
                    .retry
                    .speech
                    .run("text-to-speech", || remote.synthesize(script, lang, work_dir))
                {
                    Ok(audio) => return Ok(audio),
                    Err(e) => warn!("Remote TTS failed: {e:#} - using local speech"),
                }
            }
            None => info!("No TTS key - using local speech"),
        }
        self.services.local_speech.synthesize(script, lang, work_dir)
    }

    /// Where the narration is: word timing when available, otherwise the whole
    /// voiceover, otherwise a fixed first minute.
    fn speech_regions(&self, words: &[WordTimestamp], voiceover: &Path) -> Vec<SpeechRegion> {
        let regions = music::speech_regions(words, music::SPEECH_GAP_SECS);
        if !regions.is_empty() {
            return regions;
        }
        let duration = self.services.media.duration(voiceover).unwrap_or_else(|e| {
            warn!("Could not probe voiceover duration: {e:#}");
            FALLBACK_MUSIC_SECS
        });
        vec![SpeechRegion::new(0.0, duration)]
    }
}
