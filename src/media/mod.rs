//! Media tooling: external process runner, duration probing, frame images and
//! the ffmpeg-backed assembler.

pub mod ffmpeg;
pub mod frames;
pub mod probe;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::PipelineError;

pub use ffmpeg::FfmpegAssembler;

/// Captured output of a finished external tool.
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Run an external tool with a wall-clock limit. The child is killed when the
/// limit passes. A non-zero exit is an error carrying the tail of stderr.
pub fn run_tool(mut cmd: Command, timeout: Duration) -> Result<ToolOutput> {
    let tool = cmd.get_program().to_string_lossy().into_owned();
    debug!("running {tool} {:?}", cmd.get_args().collect::<Vec<_>>());

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {tool}"))?;

    // drain both pipes so a chatty tool can't block on a full buffer
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PipelineError::ToolTimeout {
                tool,
                secs: timeout.as_secs(),
            }
            .into());
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    let output = ToolOutput {
        stdout: stdout.and_then(|h| h.join().ok()).unwrap_or_default(),
        stderr: stderr.and_then(|h| h.join().ok()).unwrap_or_default(),
    };

    if !status.success() {
        let tail: String = output
            .stderr
            .chars()
            .rev()
            .take(300)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        return Err(PipelineError::ToolFailed {
            tool,
            code: status.code().unwrap_or(-1),
            stderr: tail.trim().to_string(),
        }
        .into());
    }

    Ok(output)
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Everything the final mux needs.
#[derive(Debug, Clone, PartialEq)]
pub struct AssemblyRequest {
    pub frames: Vec<PathBuf>,
    pub voiceover: PathBuf,
    pub work_dir: PathBuf,
    pub output: PathBuf,
    /// ASS subtitles to burn in.
    pub captions: Option<PathBuf>,
    pub music: Option<PathBuf>,
    pub duck_filter: Option<String>,
}

/// The media tool the pipeline hands frames, audio and captions to.
pub trait MediaAssembler {
    /// Duration of an audio or video file in seconds.
    fn duration(&self, media: &Path) -> Result<f64>;

    /// Animate frames, lay the voiceover (and optional ducked music) under them,
    /// burn in optional captions. Returns the finished video path.
    fn assemble(&self, request: &AssemblyRequest) -> Result<PathBuf>;

    /// Draw `title` over `image`, writing the result to `output`.
    fn overlay_title(&self, image: &Path, title: &str, output: &Path) -> Result<()>;
}
