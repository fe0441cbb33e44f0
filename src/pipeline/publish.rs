use anyhow::{anyhow, Result};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{artifacts, optional, required, Orchestrator, UploadOptions};
use crate::clients::UploadRequest;
use crate::error::PipelineError;
use crate::media::frames;
use crate::state::{JobRecord, Stage};

pub const THUMB_WIDTH: u32 = 1280;
pub const THUMB_HEIGHT: u32 = 720;
const DEFAULT_THUMBNAIL_PROMPT: &str = "Cinematic YouTube thumbnail";

pub(super) fn run(
    orch: &Orchestrator,
    job: &mut JobRecord,
    path: &Path,
    opts: &UploadOptions,
) -> Result<String> {
    let lang = opts.lang.as_str();
    let outputs = job.outputs(lang).cloned().unwrap_or_default();

    // The ledger keeps one upload entry for all languages; the per-language
    // URL is what marks this language as published.
    if !opts.rerun.applies_to(Stage::Upload) {
        if let Some(url) = outputs.youtube_url.clone() {
            info!("Skipping upload ({lang} already live: {url})");
            return Ok(url);
        }
    }

    let video = outputs
        .video
        .filter(|p| p.exists())
        .ok_or_else(|| PipelineError::MissingVideo {
            lang: lang.to_string(),
        })?;
    let srt = outputs.srt.filter(|p| p.exists());

    // Optional: a failed thumbnail is recorded but does not stop the upload.
    let thumbnail = match super::run_stage(
        job,
        path,
        Stage::Thumbnail,
        lang,
        opts.rerun.applies_to(Stage::Thumbnail),
        |job| {
            let thumb = orch.generate_thumbnail(job)?;
            Ok(artifacts([("path", json!(thumb))]))
        },
    ) {
        Ok(recorded) => optional::<PathBuf>(&recorded, "path").filter(|p| p.exists()),
        Err(e) => {
            warn!("Thumbnail generation failed: {e:#} - uploading without thumbnail");
            None
        }
    };

    let uploaded = super::run_stage(job, path, Stage::Upload, lang, opts.rerun.applies_to(Stage::Upload), |job| {
        let request = UploadRequest {
            video: video.clone(),
            title: job.title().to_string(),
            description: job.youtube_description.clone(),
            tags: job.youtube_tags.clone(),
            lang: lang.to_string(),
            captions: srt.clone(),
            thumbnail: thumbnail.clone(),
        };
        let url = orch
            .retry
            .upload
            .run("upload", || orch.services.host.upload(&request))?;
        Ok(artifacts([("url", json!(url))]))
    })?;
    let url: String = required(&uploaded, Stage::Upload, "url")?;

    job.outputs_mut(lang).youtube_url = Some(url.clone());
    job.save(path)?;
    info!("Live: {url}");
    Ok(url)
}

impl Orchestrator {
    fn generate_thumbnail(&self, job: &JobRecord) -> Result<PathBuf> {
        let images = self
            .services
            .images
            .as_ref()
            .ok_or_else(|| anyhow!("no image generator configured (GEMINI_API_KEY)"))?;
        let prompt = if job.thumbnail_prompt.trim().is_empty() {
            DEFAULT_THUMBNAIL_PROMPT
        } else {
            job.thumbnail_prompt.as_str()
        };

        let media_dir = self.paths.media_dir();
        std::fs::create_dir_all(&media_dir)?;
        let raw_path = media_dir.join(format!("thumb_raw_{}.png", job.job_id));
        let final_path = media_dir.join(format!("thumb_{}.png", job.job_id));

        info!("Generating thumbnail...");
        let bytes = self.retry.image.run("thumbnail generation", || {
            images.generate_image(&format!("16:9 landscape, {prompt}"))
        })?;
        let image = frames::fit_cover(&bytes, THUMB_WIDTH, THUMB_HEIGHT)?;
        frames::save_png(&image, &raw_path)?;

        info!("Adding title overlay...");
        self.services
            .media
            .overlay_title(&raw_path, job.title(), &final_path)?;
        info!("Thumbnail saved: {}", final_path.display());
        Ok(final_path)
    }
}
