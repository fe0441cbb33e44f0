use anyhow::{Context, Result};
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;

use crate::error::PipelineError;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash-exp-image-generation:generateContent";

/// Prompt in, encoded image bytes (PNG/JPEG) out.
pub trait ImageGenerator {
    fn generate_image(&self, prompt: &str) -> Result<Vec<u8>>;
}

pub struct GeminiImageClient {
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GeminiImageClient {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            client: super::http_client(Duration::from_secs(90))?,
        })
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    data: String,
}

/// Pull the first inline image out of a generateContent reply.
fn decode_image(resp: GenerateResponse) -> Result<Vec<u8>> {
    let encoded = resp
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
        .find_map(|p| p.inline_data)
        .ok_or_else(|| PipelineError::malformed("gemini", "no image in response"))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.data.trim())
        .context("Gemini returned invalid base64 image data")
}

impl ImageGenerator for GeminiImageClient {
    fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": format!("Generate an image: {prompt}") }] }],
            "generationConfig": { "responseModalities": ["IMAGE", "TEXT"] },
        });
        let resp = self
            .client
            .post(GEMINI_ENDPOINT)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .context("Failed to send request to Gemini API")?;
        let parsed: GenerateResponse = super::check_status("gemini", resp)?
            .json()
            .context("Failed to parse Gemini response")?;
        decode_image(parsed)
    }
}
