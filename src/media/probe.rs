use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use super::run_tool;

/// Parse a duration printed by a media tool.
///
/// Accepts plain seconds (`12.345`, as printed by `ffprobe -of csv=p=0`) and
/// clock form (`HH:MM:SS.ff` or `MM:SS`). The first non-empty line is used.
pub fn parse_duration(output: &str) -> Result<f64> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .context("Empty duration output")?;
    let raw = line.trim_start_matches("Duration:").trim();
    let raw = raw.split(',').next().unwrap_or(raw).trim();

    let seconds = if raw.contains(':') {
        let mut total = 0.0;
        for part in raw.split(':') {
            let value: f64 = part
                .trim()
                .parse()
                .with_context(|| format!("Invalid duration component `{part}` in `{raw}`"))?;
            total = total * 60.0 + value;
        }
        total
    } else {
        raw.parse::<f64>()
            .with_context(|| format!("Invalid duration `{raw}`"))?
    };

    if !seconds.is_finite() || seconds < 0.0 {
        bail!("Invalid duration `{raw}`");
    }
    Ok(seconds)
}

/// Duration of a media file via ffprobe.
pub fn probe_duration(ffprobe: &str, path: &Path, timeout: Duration) -> Result<f64> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "quiet", "-show_entries", "format=duration", "-of", "csv=p=0"])
        .arg(path);
    let out = run_tool(cmd, timeout)?;
    parse_duration(&out.stdout).with_context(|| format!("ffprobe gave no duration for {}", path.display()))
}
