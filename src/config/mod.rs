use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const VIDEO_WIDTH: u32 = 1080;
pub const VIDEO_HEIGHT: u32 = 1920;

const DEFAULT_VOICE_ID: &str = "JBFqnCBsd6RMkjVDRZzb";

/// Credentials for one remote service.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct ServiceConfig {
    pub api_key: Option<String>,
    pub api_key_command: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct YouTubeConfig {
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct VoiceConfig {
    pub en: Option<String>,
    pub hi: Option<String>,
    /// Local speech command used when no remote voice is available.
    pub local_command: Option<String>,
}

/// Per-source block under `[topic_sources.<name>]`. Each source reads only the
/// keys it understands.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct TopicSourceConfig {
    pub enabled: Option<bool>,
    pub subreddits: Option<Vec<String>>,
    pub feeds: Option<Vec<String>>,
    pub geo: Option<String>,
    pub bearer_token: Option<String>,
}

/// Top-level config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct AppConfig {
    pub anthropic: Option<ServiceConfig>,
    pub elevenlabs: Option<ServiceConfig>,
    pub gemini: Option<ServiceConfig>,
    pub youtube: Option<YouTubeConfig>,
    pub voice: Option<VoiceConfig>,
    #[serde(default)]
    pub topic_sources: BTreeMap<String, TopicSourceConfig>,
}

impl AppConfig {
    /// Load `<home>/config.toml`. Returns default if the file doesn't exist.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        Self::load_from(&paths.config_file())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
        Ok(config)
    }

    /// Get service config by name.
    pub fn service_config(&self, service: &str) -> Option<&ServiceConfig> {
        match service {
            "anthropic" => self.anthropic.as_ref(),
            "elevenlabs" => self.elevenlabs.as_ref(),
            "gemini" => self.gemini.as_ref(),
            _ => None,
        }
    }

    pub fn topic_source(&self, name: &str) -> Option<&TopicSourceConfig> {
        self.topic_sources.get(name)
    }

    /// ElevenLabs voice for a language: env var, then config, then the default voice.
    pub fn voice_id(&self, lang: &str) -> String {
        let env_name = format!("VOICE_ID_{}", lang.to_uppercase());
        if let Ok(val) = std::env::var(&env_name) {
            if !val.is_empty() {
                return val;
            }
        }
        let configured = self.voice.as_ref().and_then(|v| match lang {
            "hi" => v.hi.clone(),
            _ => v.en.clone(),
        });
        configured.unwrap_or_else(|| DEFAULT_VOICE_ID.to_string())
    }

    pub fn local_speech_command(&self) -> String {
        self.voice
            .as_ref()
            .and_then(|v| v.local_command.clone())
            .unwrap_or_else(|| {
                if cfg!(target_os = "macos") {
                    "say".to_string()
                } else {
                    "espeak-ng".to_string()
                }
            })
    }

    /// Display config with secrets redacted.
    pub fn display_redacted(&self) -> String {
        let mut lines = Vec::new();
        for name in ["anthropic", "elevenlabs", "gemini"] {
            if let Some(sc) = self.service_config(name) {
                lines.push(format!("[{name}]"));
                display_service_config(&mut lines, sc);
            }
        }
        if let Some(ref yt) = self.youtube {
            lines.push("[youtube]".to_string());
            if let Some(ref p) = yt.token_path {
                lines.push(format!("  token_path = \"{}\"", p.display()));
            }
        }
        if let Some(ref voice) = self.voice {
            lines.push("[voice]".to_string());
            if let Some(ref en) = voice.en {
                lines.push(format!("  en = \"{en}\""));
            }
            if let Some(ref hi) = voice.hi {
                lines.push(format!("  hi = \"{hi}\""));
            }
            if let Some(ref cmd) = voice.local_command {
                lines.push(format!("  local_command = \"{cmd}\""));
            }
        }
        for (name, src) in &self.topic_sources {
            lines.push(format!("[topic_sources.{name}]"));
            if let Some(enabled) = src.enabled {
                lines.push(format!("  enabled = {enabled}"));
            }
            if let Some(ref subs) = src.subreddits {
                lines.push(format!("  subreddits = {subs:?}"));
            }
            if let Some(ref feeds) = src.feeds {
                lines.push(format!("  feeds = {feeds:?}"));
            }
            if let Some(ref geo) = src.geo {
                lines.push(format!("  geo = \"{geo}\""));
            }
            if let Some(ref token) = src.bearer_token {
                lines.push(format!("  bearer_token = \"{}\"", redact(token)));
            }
        }
        if lines.is_empty() {
            lines.push("(nothing configured)".to_string());
        }
        lines.join("\n")
    }
}

fn redact(secret: &str) -> String {
    if secret.len() > 8 {
        format!("{}...{}", &secret[..4], &secret[secret.len() - 4..])
    } else {
        "****".to_string()
    }
}

fn display_service_config(lines: &mut Vec<String>, sc: &ServiceConfig) {
    if let Some(ref key) = sc.api_key {
        lines.push(format!("  api_key = \"{}\"", redact(key)));
    }
    if let Some(ref cmd) = sc.api_key_command {
        lines.push(format!("  api_key_command = \"{}\"", cmd));
    }
}

/// Resolve a credential through the chain: env var > config key > config command.
pub fn resolve_credential(env_var_name: &str, config: Option<&ServiceConfig>) -> Result<String> {
    match resolve_optional_credential(env_var_name, config)? {
        Some(secret) => Ok(secret),
        None => bail!(
            "No API key found. Provide via {} env var or config.toml",
            env_var_name
        ),
    }
}

/// Like [`resolve_credential`] but an absent credential is `None`, not an error.
pub fn resolve_optional_credential(
    env_var_name: &str,
    config: Option<&ServiceConfig>,
) -> Result<Option<String>> {
    // 1. Environment variable
    if let Ok(val) = std::env::var(env_var_name) {
        if !val.is_empty() {
            return Ok(Some(val));
        }
    }

    if let Some(sc) = config {
        // 2. Config file api_key
        if let Some(ref key) = sc.api_key {
            if !key.is_empty() {
                return Ok(Some(key.clone()));
            }
        }

        // 3. External command
        if let Some(ref cmd) = sc.api_key_command {
            if !cmd.is_empty() {
                let output = std::process::Command::new("sh")
                    .arg("-c")
                    .arg(cmd)
                    .output()
                    .with_context(|| format!("Failed to run api_key_command: {cmd}"))?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    bail!(
                        "api_key_command failed (exit {}): {}",
                        output.status.code().unwrap_or(-1),
                        stderr.trim()
                    );
                }

                let secret = String::from_utf8(output.stdout)
                    .context("api_key_command output is not valid UTF-8")?
                    .trim()
                    .to_string();

                if !secret.is_empty() {
                    return Ok(Some(secret));
                }
            }
        }
    }

    Ok(None)
}

/// Where everything lives. All data sits under one home directory.
#[derive(Debug, Clone, PartialEq)]
pub struct AppPaths {
    pub home: PathBuf,
}

impl AppPaths {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// `~/.shortreel`, unless overridden.
    pub fn resolve(home_override: Option<PathBuf>) -> Result<Self> {
        if let Some(home) = home_override {
            return Ok(Self::new(home));
        }
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self::new(home.join(".shortreel")))
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    pub fn drafts_dir(&self) -> PathBuf {
        self.home.join("drafts")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.home.join("media")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn music_dir(&self) -> PathBuf {
        self.home.join("music")
    }

    pub fn draft_path(&self, job_id: &str) -> PathBuf {
        self.drafts_dir().join(format!("{job_id}.json"))
    }

    /// Per-job, per-language scratch directory for intermediate media.
    pub fn work_dir(&self, job_id: &str, lang: &str) -> PathBuf {
        self.media_dir().join(format!("work_{job_id}_{lang}"))
    }

    pub fn youtube_token_path(&self, config: &AppConfig) -> PathBuf {
        config
            .youtube
            .as_ref()
            .and_then(|y| y.token_path.clone())
            .unwrap_or_else(|| self.home.join("youtube_token.json"))
    }
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.shortreel/config.toml
# Credential resolution order: env var > api_key > api_key_command

[anthropic]
# api_key = "sk-ant-..."            # or ANTHROPIC_API_KEY; without it the `claude` CLI is used
# api_key_command = "your-secrets-manager-command-here"

[elevenlabs]
# api_key = "..."                   # or ELEVENLABS_API_KEY; without it local speech is used

[gemini]
# api_key = "..."                   # or GEMINI_API_KEY; used for b-roll and thumbnails

[youtube]
# token_path = "/home/you/.shortreel/youtube_token.json"

[voice]
# en = "JBFqnCBsd6RMkjVDRZzb"
# hi = "JBFqnCBsd6RMkjVDRZzb"
# local_command = "espeak-ng"

[topic_sources.reddit]
# enabled = true
# subreddits = ["technology", "worldnews"]

[topic_sources.rss]
# enabled = true
# feeds = ["https://hnrss.org/frontpage"]

[topic_sources.google_trends]
# enabled = true
# geo = "IN"

[topic_sources.twitter]
# enabled = false
# bearer_token = "..."
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config(paths: &AppPaths) -> Result<bool> {
    let path = paths.config_file();
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    write_secret_file(&path, default_config_template())?;
    Ok(true)
}

/// Write a file readable only by the owner.
fn write_secret_file(path: &Path, content: &str) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&AppPaths::new(dir.path())).unwrap();
        assert!(config.anthropic.is_none());
        assert!(config.topic_sources.is_empty());
    }

    #[test]
    fn template_parses() {
        let config: AppConfig = toml::from_str(default_config_template()).unwrap();
        assert!(config.anthropic.is_some());
        assert!(config.topic_sources.contains_key("reddit"));
    }

    #[test]
    fn parses_sources_and_services() {
        let raw = r#"
[gemini]
api_key = "gem-1234567890"

[topic_sources.reddit]
subreddits = ["rust"]

[topic_sources.twitter]
enabled = true
"#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(
            config.topic_source("reddit").and_then(|s| s.subreddits.clone()),
            Some(vec!["rust".to_string()])
        );
        assert_eq!(config.topic_source("twitter").and_then(|s| s.enabled), Some(true));

        let shown = config.display_redacted();
        assert!(shown.contains("api_key = \"gem-...7890\""));
        assert!(!shown.contains("gem-1234567890"));
    }

    #[test]
    fn credential_from_config_then_command() {
        let sc = ServiceConfig {
            api_key: Some("from-config".into()),
            api_key_command: Some("echo from-command".into()),
        };
        let key = resolve_credential("SHORTREEL_TEST_UNSET_KEY_A", Some(&sc)).unwrap();
        assert_eq!(key, "from-config");

        let sc = ServiceConfig {
            api_key: None,
            api_key_command: Some("echo from-command".into()),
        };
        let key = resolve_credential("SHORTREEL_TEST_UNSET_KEY_B", Some(&sc)).unwrap();
        assert_eq!(key, "from-command");
    }

    #[test]
    fn missing_credential() {
        assert!(resolve_credential("SHORTREEL_TEST_UNSET_KEY_C", None).is_err());
        assert_eq!(
            resolve_optional_credential("SHORTREEL_TEST_UNSET_KEY_C", None).unwrap(),
            None
        );
    }

    #[test]
    fn init_writes_template_once() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::new(dir.path().join("home"));
        assert!(init_config(&paths).unwrap());
        assert!(!init_config(&paths).unwrap());
        let written = std::fs::read_to_string(paths.config_file()).unwrap();
        assert_eq!(written, default_config_template());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(paths.config_file()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn work_dirs_are_per_language() {
        let paths = AppPaths::new("/data");
        assert_eq!(paths.work_dir("42", "hi"), PathBuf::from("/data/media/work_42_hi"));
        assert_eq!(paths.draft_path("42"), PathBuf::from("/data/drafts/42.json"));
    }
}
