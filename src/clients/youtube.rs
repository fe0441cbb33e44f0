use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::PipelineError;

const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/youtube/v3";
const CATEGORY_ENTERTAINMENT: &str = "20";
const MAX_TITLE_CHARS: usize = 100;

/// Everything needed to publish one rendered video.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub video: PathBuf,
    pub title: String,
    pub description: String,
    /// Comma-separated.
    pub tags: String,
    pub lang: String,
    pub captions: Option<PathBuf>,
    pub thumbnail: Option<PathBuf>,
}

pub trait VideoHost {
    /// Publish the video and return its public URL.
    fn upload(&self, request: &UploadRequest) -> Result<String>;
}

/// Authorized-user token file as written by the Google OAuth client libraries.
/// Only the access token is used; keeping it fresh is the OAuth client's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl OAuthToken {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "YouTube OAuth token not found at {}. Create it with an OAuth client first.",
                path.display()
            )
        })?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse YouTube token: {}", path.display()))
    }

    pub fn expiry_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.expiry.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time().is_some_and(|exp| exp <= now)
    }
}

/// Snippet + status body for a new video.
pub fn video_metadata(request: &UploadRequest) -> serde_json::Value {
    let title: String = request.title.chars().take(MAX_TITLE_CHARS).collect();
    let tags: Vec<&str> = request
        .tags
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    serde_json::json!({
        "snippet": {
            "title": title,
            "description": request.description,
            "tags": tags,
            "categoryId": CATEGORY_ENTERTAINMENT,
            "defaultLanguage": request.lang,
            "defaultAudioLanguage": request.lang,
        },
        "status": { "privacyStatus": "private", "selfDeclaredMadeForKids": false },
    })
}

pub struct YouTubeClient {
    token_path: PathBuf,
    client: reqwest::blocking::Client,
}

impl YouTubeClient {
    pub fn new(token_path: PathBuf) -> Result<Self> {
        Ok(Self {
            token_path,
            client: super::http_client(Duration::from_secs(600))?,
        })
    }

    fn access_token(&self) -> Result<String> {
        let token = OAuthToken::load(&self.token_path)?;
        if token.is_expired(Utc::now()) {
            warn!(
                "YouTube token at {} looks expired (expiry {}); the upload will likely be rejected",
                self.token_path.display(),
                token.expiry.as_deref().unwrap_or_default()
            );
        }
        Ok(token.token)
    }

    /// Start a resumable session with `metadata`, then send `bytes` in one PUT.
    fn resumable_upload(
        &self,
        access_token: &str,
        init_url: &str,
        metadata: &serde_json::Value,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<serde_json::Value> {
        let resp = self
            .client
            .post(init_url)
            .bearer_auth(access_token)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", bytes.len())
            .json(metadata)
            .send()
            .context("Failed to start YouTube upload session")?;
        let resp = super::check_status("youtube", resp)?;
        let session = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| PipelineError::malformed("youtube", "upload session has no Location"))?;

        let resp = self
            .client
            .put(&session)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .context("Failed to send upload body to YouTube")?;
        super::check_status("youtube", resp)?
            .json()
            .context("Failed to parse YouTube upload response")
    }

    fn upload_captions(&self, access_token: &str, video_id: &str, srt: &Path, lang: &str) -> Result<()> {
        let metadata = serde_json::json!({
            "snippet": {
                "videoId": video_id,
                "language": lang,
                "name": lang.to_uppercase(),
                "isDraft": false,
            }
        });
        let bytes = std::fs::read(srt).with_context(|| format!("Failed to read {}", srt.display()))?;
        self.resumable_upload(
            access_token,
            &format!("{UPLOAD_BASE}/captions?uploadType=resumable&part=snippet"),
            &metadata,
            "application/octet-stream",
            bytes,
        )?;
        Ok(())
    }

    fn set_thumbnail(&self, access_token: &str, video_id: &str, image: &Path) -> Result<()> {
        let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
        let resp = self
            .client
            .post(format!("{UPLOAD_BASE}/thumbnails/set"))
            .query(&[("videoId", video_id), ("uploadType", "media")])
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(bytes)
            .send()
            .context("Failed to send thumbnail")?;
        super::check_status("youtube", resp)?;
        Ok(())
    }
}

impl VideoHost for YouTubeClient {
    fn upload(&self, request: &UploadRequest) -> Result<String> {
        let access_token = self.access_token()?;
        let file_name = request
            .video
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!("Uploading {file_name}...");

        let bytes = std::fs::read(&request.video)
            .with_context(|| format!("Failed to read {}", request.video.display()))?;
        let response = self.resumable_upload(
            &access_token,
            &format!("{UPLOAD_BASE}/videos?uploadType=resumable&part=snippet,status"),
            &video_metadata(request),
            "video/mp4",
            bytes,
        )?;
        let video_id = response
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::malformed("youtube", "upload response has no video id"))?
            .to_string();
        let url = format!("https://youtu.be/{video_id}");
        info!("Uploaded: {url}");

        if let Some(srt) = request.captions.as_deref().filter(|p| p.exists()) {
            match self.upload_captions(&access_token, &video_id, srt, &request.lang) {
                Ok(()) => info!("Captions uploaded."),
                Err(e) => warn!("Caption upload failed: {e:#}"),
            }
        }
        if let Some(thumb) = request.thumbnail.as_deref().filter(|p| p.exists()) {
            match self.set_thumbnail(&access_token, &video_id, thumb) {
                Ok(()) => info!("Thumbnail uploaded."),
                Err(e) => warn!("Thumbnail upload failed: {e:#}"),
            }
        }

        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request(title: &str, tags: &str) -> UploadRequest {
        UploadRequest {
            video: PathBuf::from("/m/pipeline_1_en.mp4"),
            title: title.to_string(),
            description: "desc".to_string(),
            tags: tags.to_string(),
            lang: "hi".to_string(),
            captions: None,
            thumbnail: None,
        }
    }

    #[test]
    fn metadata_truncates_title_and_splits_tags() {
        let long = "x".repeat(150);
        let meta = video_metadata(&request(&long, "ai, tech,,news "));
        assert_eq!(meta["snippet"]["title"].as_str().unwrap().len(), 100);
        assert_eq!(meta["snippet"]["tags"], serde_json::json!(["ai", "tech", "news"]));
        assert_eq!(meta["snippet"]["categoryId"], "20");
        assert_eq!(meta["snippet"]["defaultAudioLanguage"], "hi");
        assert_eq!(meta["status"]["privacyStatus"], "private");
    }

    #[test]
    fn token_keeps_unknown_fields() {
        let json = r#"{"token":"ya29","refresh_token":"r","scopes":["a"],"expiry":"2026-01-01T00:00:00.000000Z"}"#;
        let token: OAuthToken = serde_json::from_str(json).unwrap();
        let back = serde_json::to_value(&token).unwrap();
        assert_eq!(back["scopes"], serde_json::json!(["a"]));
        assert_eq!(back["token"], "ya29");
    }

    #[test]
    fn expiry_accepts_both_timestamp_forms() {
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut token: OAuthToken =
            serde_json::from_str(r#"{"token":"t","expiry":"2026-06-01T11:00:00.000000Z"}"#).unwrap();
        assert!(token.is_expired(now));

        token.expiry = Some("2026-06-01T13:00:00".to_string());
        assert!(!token.is_expired(now));

        token.expiry = None;
        assert!(!token.is_expired(now));
    }

    #[test]
    fn missing_token_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = OAuthToken::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(err.to_string().contains("token not found"));
    }
}
