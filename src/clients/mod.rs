//! Collaborators the pipeline talks to: text, image and speech generation,
//! transcription and video hosting. Each sits behind a trait so the
//! orchestrator can be driven with fakes.

pub mod images;
pub mod llm;
pub mod speech;
pub mod transcribe;
pub mod youtube;

use anyhow::{Context, Result};
use std::time::Duration;

use crate::error::PipelineError;

pub use images::{GeminiImageClient, ImageGenerator};
pub use llm::{strip_code_fence, AnthropicClient, ClaudeCli, TextGenerator};
pub use speech::{ElevenLabsClient, LocalSpeech, SpeechSynthesizer};
pub use transcribe::{Transcriber, WhisperCli};
pub use youtube::{UploadRequest, VideoHost, YouTubeClient};

pub const USER_AGENT: &str = concat!("shortreel/", env!("CARGO_PKG_VERSION"));

pub fn http_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

/// Pass 2xx responses through; anything else becomes [`PipelineError::Http`].
pub(crate) fn check_status(
    service: &str,
    resp: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().unwrap_or_default();
    Err(PipelineError::http(service, status.as_u16(), &body).into())
}
