use thiserror::Error;

use crate::state::Stage;

/// Failures callers need to tell apart. Everything else travels as `anyhow::Error`.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Http {
        service: String,
        status: u16,
        body: String,
    },

    #[error("{tool} exited with status {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("no produced video found for lang={lang}. Run produce first.")]
    MissingVideo { lang: String },

    #[error("job record schema v{found} is newer than supported v{supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("stage {stage} has no recorded artifact `{key}`")]
    MissingArtifact { stage: Stage, key: String },
}

impl PipelineError {
    pub fn malformed(service: &str, message: impl Into<String>) -> Self {
        PipelineError::MalformedResponse {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// HTTP error with the response body cut down to something printable.
    pub fn http(service: &str, status: u16, body: &str) -> Self {
        PipelineError::Http {
            service: service.to_string(),
            status,
            body: body.chars().take(200).collect(),
        }
    }
}
