use anyhow::{Context, Result};
use serde::Deserialize;
use std::process::Command;
use std::time::Duration;
use tracing::info;

use crate::config::{resolve_optional_credential, AppConfig};
use crate::error::PipelineError;
use crate::media::run_tool;

const MESSAGES_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-6";
const MAX_TOKENS: u32 = 1500;
const MAX_TURNS_NOTICE: &str = "Error: Reached max turns (3)";

/// Prompt in, plain text out.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Pick the Messages API when a key resolves, the `claude` CLI otherwise.
pub fn from_config(config: &AppConfig) -> Result<Box<dyn TextGenerator>> {
    match resolve_optional_credential("ANTHROPIC_API_KEY", config.service_config("anthropic"))? {
        Some(key) => Ok(Box::new(AnthropicClient::new(key)?)),
        None => {
            info!("No Anthropic API key - using the claude CLI for text generation");
            Ok(Box::new(ClaudeCli::default()))
        }
    }
}

pub struct AnthropicClient {
    api_key: String,
    model: String,
    client: reqwest::blocking::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Result<Self> {
        Ok(Self {
            api_key,
            model: DEFAULT_MODEL.to_string(),
            client: super::http_client(Duration::from_secs(120))?,
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

impl TextGenerator for AnthropicClient {
    fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let resp = self
            .client
            .post(MESSAGES_ENDPOINT)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .context("Failed to send request to Anthropic API")?;
        let parsed: MessagesResponse = super::check_status("anthropic", resp)?
            .json()
            .context("Failed to parse Anthropic response")?;

        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| PipelineError::malformed("anthropic", "no text block in reply").into())
    }
}

/// The `claude` CLI in print mode.
pub struct ClaudeCli {
    pub program: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCli {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

impl TextGenerator for ClaudeCli {
    fn generate(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.env_remove("CLAUDECODE")
            .args(["--print", "--model", &self.model, "--max-turns", "3", "-p", prompt]);
        let output = run_tool(cmd, self.timeout)?;
        Ok(strip_max_turns(&output.stdout).to_string())
    }
}

fn strip_max_turns(output: &str) -> &str {
    let trimmed = output.trim();
    trimmed
        .strip_suffix(MAX_TURNS_NOTICE)
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Remove a surrounding markdown fence (and a `json` tag) from a model reply.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = rest.find("```").map_or(rest, |end| &rest[..end]);
    inner.strip_prefix("json").unwrap_or(inner).trim()
}
