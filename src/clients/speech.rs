use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::media::run_tool;

const ELEVENLABS_ENDPOINT: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const ELEVENLABS_MODEL: &str = "eleven_multilingual_v2";

/// Text in, an MP3 on disk out.
pub trait SpeechSynthesizer {
    /// Synthesize `script` in `lang` into `out_dir`, returning the audio path.
    fn synthesize(&self, script: &str, lang: &str, out_dir: &Path) -> Result<PathBuf>;
}

pub struct ElevenLabsClient {
    api_key: String,
    /// (lang, voice id); unknown languages use the first entry.
    voices: Vec<(String, String)>,
    client: reqwest::blocking::Client,
}

impl ElevenLabsClient {
    pub fn new(api_key: String, voices: Vec<(String, String)>) -> Result<Self> {
        Ok(Self {
            api_key,
            voices,
            client: super::http_client(Duration::from_secs(60))?,
        })
    }

    fn voice_for(&self, lang: &str) -> Option<&str> {
        self.voices
            .iter()
            .find(|(l, _)| l == lang)
            .or_else(|| self.voices.first())
            .map(|(_, v)| v.as_str())
    }
}

impl SpeechSynthesizer for ElevenLabsClient {
    fn synthesize(&self, script: &str, lang: &str, out_dir: &Path) -> Result<PathBuf> {
        let voice = self
            .voice_for(lang)
            .context("No ElevenLabs voice configured")?;
        let body = serde_json::json!({
            "text": script,
            "model_id": ELEVENLABS_MODEL,
            "voice_settings": {
                "stability": 0.4,
                "similarity_boost": 0.85,
                "style": 0.3,
                "use_speaker_boost": true,
            },
        });
        let resp = self
            .client
            .post(format!("{ELEVENLABS_ENDPOINT}/{voice}"))
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .context("Failed to send request to ElevenLabs")?;
        let audio = super::check_status("elevenlabs", resp)?
            .bytes()
            .context("Failed to read ElevenLabs audio")?;

        let out_path = out_dir.join(format!("voiceover_{lang}.mp3"));
        std::fs::write(&out_path, &audio)
            .with_context(|| format!("Failed to write {}", out_path.display()))?;
        Ok(out_path)
    }
}

/// Speech from a local command (`say` or `espeak-ng`), converted to MP3.
pub struct LocalSpeech {
    pub command: String,
    pub ffmpeg: String,
    pub timeout: Duration,
}

impl LocalSpeech {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ffmpeg: "ffmpeg".to_string(),
            timeout: Duration::from_secs(300),
        }
    }

    fn is_say(&self) -> bool {
        Path::new(&self.command)
            .file_name()
            .is_some_and(|name| name == "say")
    }

    /// Arguments that make the speech command write `script` to `raw`.
    fn speech_args(&self, script: &str, lang: &str, raw: &Path) -> Vec<String> {
        let raw = raw.to_string_lossy().into_owned();
        if self.is_say() {
            vec!["-o".to_string(), raw, script.to_string()]
        } else {
            vec![
                "-v".to_string(),
                lang.to_string(),
                "-w".to_string(),
                raw,
                script.to_string(),
            ]
        }
    }

    fn raw_extension(&self) -> &'static str {
        if self.is_say() {
            "aiff"
        } else {
            "wav"
        }
    }
}

impl SpeechSynthesizer for LocalSpeech {
    fn synthesize(&self, script: &str, lang: &str, out_dir: &Path) -> Result<PathBuf> {
        let raw = out_dir.join(format!("voiceover_local.{}", self.raw_extension()));
        let mp3 = out_dir.join("voiceover_local.mp3");

        let mut speak = Command::new(&self.command);
        speak.args(self.speech_args(script, lang, &raw));
        run_tool(speak, self.timeout)?;

        let mut convert = Command::new(&self.ffmpeg);
        convert
            .arg("-i")
            .arg(&raw)
            .args(["-acodec", "libmp3lame"])
            .arg(&mp3)
            .args(["-y", "-loglevel", "quiet"]);
        run_tool(convert, self.timeout)?;
        Ok(mp3)
    }
}
