use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;

use super::{probe, run_tool, AssemblyRequest, MediaAssembler};
use crate::config::{VIDEO_HEIGHT, VIDEO_WIDTH};

/// Ken Burns motion applied to a still frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KenBurns {
    ZoomIn,
    PanRight,
    ZoomOut,
}

impl KenBurns {
    const CYCLE: [KenBurns; 3] = [KenBurns::ZoomIn, KenBurns::PanRight, KenBurns::ZoomOut];

    pub fn for_index(i: usize) -> Self {
        Self::CYCLE[i % Self::CYCLE.len()]
    }
}

fn scaled(v: u32, factor: f64) -> u32 {
    (v as f64 * factor) as u32
}

/// `-vf` chain animating one still over `duration` seconds.
pub fn ken_burns_filter(effect: KenBurns, duration: f64, width: u32, height: u32, fps: u32) -> String {
    let frames = ((duration * fps as f64) as u32).max(1);
    let centre = "x='iw/2-(iw/zoom/2)':y='ih/2-(ih/zoom/2)'";
    match effect {
        KenBurns::ZoomIn => format!(
            "scale={}:{},zoompan=z='1.0+0.12*on/{frames}':{centre}:d={frames}:s={width}x{height}:fps={fps}",
            scaled(width, 1.12),
            scaled(height, 1.12),
        ),
        KenBurns::PanRight => format!(
            "scale={}:{},zoompan=z=1.15:x='0.15*iw*on/{frames}':y='ih*0.075':d={frames}:s={width}x{height}:fps={fps}",
            scaled(width, 1.15),
            scaled(height, 1.15),
        ),
        KenBurns::ZoomOut => format!(
            "scale={}:{},zoompan=z='1.12-0.12*on/{frames}':{centre}:d={frames}:s={width}x{height}:fps={fps}",
            scaled(width, 1.12),
            scaled(height, 1.12),
        ),
    }
}

/// Escape a path for use inside an ffmpeg filter argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Concat-demuxer list for the animated segments.
pub fn concat_list(segments: &[PathBuf]) -> String {
    segments
        .iter()
        .map(|p| format!("file '{}'", p.to_string_lossy().replace('\'', "'\\''")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Arguments for the final mux of merged video + voiceover, with optional
/// burned-in captions and optional looped, ducked music.
pub fn final_mux_args(
    merged: &Path,
    voiceover: &Path,
    output: &Path,
    captions: Option<&Path>,
    music: Option<&Path>,
    duck_filter: Option<&str>,
    duration: f64,
) -> Vec<String> {
    let s = |p: &Path| p.to_string_lossy().into_owned();
    let subtitles = captions.map(|c| format!("ass={}", escape_filter_path(c)));

    let mut args = vec!["-i".to_string(), s(merged), "-i".to_string(), s(voiceover)];

    match music {
        Some(track) => {
            let mut graph = format!("[2:a]atrim=0:{duration:.3}");
            if let Some(duck) = duck_filter.filter(|d| !d.is_empty()) {
                graph.push(',');
                graph.push_str(duck);
            }
            graph.push_str("[music];[1:a][music]amix=inputs=2:duration=first:dropout_transition=2[aout]");
            let video_map = match &subtitles {
                Some(sub) => {
                    graph.push_str(&format!(";[0:v]{sub}[vout]"));
                    "[vout]"
                }
                None => "0:v",
            };
            args.extend(
                [
                    "-stream_loop",
                    "-1",
                    "-i",
                ]
                .map(String::from),
            );
            args.push(s(track));
            args.extend(["-filter_complex".to_string(), graph]);
            args.extend(["-map", video_map, "-map", "[aout]"].map(String::from));
            args.extend(
                ["-c:v", "libx264", "-preset", "fast", "-pix_fmt", "yuv420p"].map(String::from),
            );
        }
        None => {
            args.extend(["-map", "0:v", "-map", "1:a"].map(String::from));
            match &subtitles {
                Some(sub) => {
                    args.extend(["-vf".to_string(), sub.clone()]);
                    args.extend(
                        ["-c:v", "libx264", "-preset", "fast", "-pix_fmt", "yuv420p"]
                            .map(String::from),
                    );
                }
                None => args.extend(["-c:v", "copy"].map(String::from)),
            }
        }
    }

    args.extend(["-c:a", "aac", "-shortest"].map(String::from));
    args.push(s(output));
    args.extend(["-y", "-loglevel", "quiet"].map(String::from));
    args
}

/// Greedy word wrap at `max_chars` per line.
pub fn wrap_title(title: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in title.split_whitespace() {
        let candidate_len = current.chars().count() + usize::from(!current.is_empty()) + word.chars().count();
        if !current.is_empty() && candidate_len > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// ffmpeg/ffprobe on PATH.
#[derive(Debug, Clone)]
pub struct FfmpegAssembler {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub timeout: Duration,
}

impl Default for FfmpegAssembler {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            width: VIDEO_WIDTH,
            height: VIDEO_HEIGHT,
            fps: 30,
            timeout: Duration::from_secs(600),
        }
    }
}

impl FfmpegAssembler {
    fn ffmpeg<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(args);
        run_tool(cmd, self.timeout)?;
        Ok(())
    }

    fn animate_frame(&self, image: &Path, output: &Path, duration: f64, effect: KenBurns) -> Result<()> {
        let vf = ken_burns_filter(effect, duration, self.width, self.height, self.fps);
        let mut args: Vec<String> = ["-loop", "1", "-i"].map(String::from).to_vec();
        args.push(image.to_string_lossy().into_owned());
        args.extend([
            "-vf".to_string(),
            vf,
            "-t".to_string(),
            format!("{duration:.3}"),
            "-r".to_string(),
            self.fps.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            output.to_string_lossy().into_owned(),
        ]);
        args.extend(["-y", "-loglevel", "quiet"].map(String::from));
        self.ffmpeg(args)
    }
}

impl MediaAssembler for FfmpegAssembler {
    fn duration(&self, media: &Path) -> Result<f64> {
        probe::probe_duration(&self.ffprobe, media, Duration::from_secs(30))
    }

    fn assemble(&self, request: &AssemblyRequest) -> Result<PathBuf> {
        if request.frames.is_empty() {
            bail!("No frames to assemble");
        }
        info!("Assembling video...");
        let duration = self.duration(&request.voiceover)?;
        let per_frame = duration / request.frames.len() as f64;

        let mut animated = Vec::with_capacity(request.frames.len());
        for (i, frame) in request.frames.iter().enumerate() {
            let anim = request.work_dir.join(format!("anim_{i}.mp4"));
            self.animate_frame(frame, &anim, per_frame + 0.1, KenBurns::for_index(i))
                .with_context(|| format!("Failed to animate frame {}", frame.display()))?;
            animated.push(anim);
        }

        let concat_file = request.work_dir.join("concat.txt");
        std::fs::write(&concat_file, concat_list(&animated))
            .with_context(|| format!("Failed to write {}", concat_file.display()))?;

        let merged = request.work_dir.join("merged_video.mp4");
        let mut concat_args: Vec<String> = ["-f", "concat", "-safe", "0", "-i"].map(String::from).to_vec();
        concat_args.push(concat_file.to_string_lossy().into_owned());
        concat_args.extend(
            ["-c:v", "libx264", "-preset", "fast", "-pix_fmt", "yuv420p"].map(String::from),
        );
        concat_args.push(merged.to_string_lossy().into_owned());
        concat_args.extend(["-y", "-loglevel", "quiet"].map(String::from));
        self.ffmpeg(concat_args).context("Failed to concatenate segments")?;

        let captions = request.captions.as_deref().filter(|p| p.exists());
        let music = request.music.as_deref().filter(|p| p.exists());
        let args = final_mux_args(
            &merged,
            &request.voiceover,
            &request.output,
            captions,
            music,
            request.duck_filter.as_deref(),
            duration,
        );
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.ffmpeg(args).context("Final mux failed")?;

        info!("Video assembled: {}", request.output.display());
        Ok(request.output.clone())
    }

    fn overlay_title(&self, image: &Path, title: &str, output: &Path) -> Result<()> {
        let text_file = output.with_extension("title.txt");
        std::fs::write(&text_file, wrap_title(title, 28).join("\n"))
            .with_context(|| format!("Failed to write {}", text_file.display()))?;

        let vf = format!(
            "drawtext=textfile='{}':fontcolor=white:fontsize=64:line_spacing=10:\
             x=(w-text_w)/2:y=h-text_h-60:shadowcolor=black:shadowx=3:shadowy=3",
            escape_filter_path(&text_file)
        );
        let args: Vec<String> = vec![
            "-i".into(),
            image.to_string_lossy().into_owned(),
            "-vf".into(),
            vf,
            "-frames:v".into(),
            "1".into(),
            output.to_string_lossy().into_owned(),
            "-y".into(),
            "-loglevel".into(),
            "quiet".into(),
        ];
        self.ffmpeg(args).context("Title overlay failed")
    }
}
