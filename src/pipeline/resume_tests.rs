use anyhow::{bail, Result};
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::*;
use crate::captions::WordTimestamp;
use crate::clients::UploadRequest;
use crate::media::AssemblyRequest;
use crate::state::StageStatus;

const DRAFT_REPLY: &str = r#"{
    "script": "Big upset tonight. Here is what happened.",
    "script_hi": "Aaj raat bada ulatfer.",
    "broll_prompts": ["stadium lights", "trophy lift"],
    "youtube_title": "The upset nobody saw coming",
    "youtube_description": "What happened tonight",
    "youtube_tags": "esports, upset",
    "instagram_caption": "Upset!",
    "thumbnail_prompt": "a trophy under stadium lights"
}"#;

/// Shared record of collaborator calls, one line per call.
#[derive(Clone, Default)]
struct CallLog(Rc<RefCell<Vec<String>>>);

impl CallLog {
    fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    fn count(&self, prefix: &str) -> usize {
        self.0.borrow().iter().filter(|e| e.starts_with(prefix)).count()
    }

    fn entries(&self, prefix: &str) -> Vec<String> {
        self.0
            .borrow()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .cloned()
            .collect()
    }
}

struct FakeText(CallLog);

impl TextGenerator for FakeText {
    fn generate(&self, _prompt: &str) -> Result<String> {
        self.0.push("text");
        Ok(DRAFT_REPLY.to_string())
    }
}

struct FakeSearch(CallLog);

impl WebSearch for FakeSearch {
    fn snippets(&self, query: &str) -> Result<Vec<String>> {
        self.0.push(format!("search:{query}"));
        Ok(vec!["Team wins the final in five maps".to_string()])
    }
}

struct FakeImages(CallLog);

impl ImageGenerator for FakeImages {
    fn generate_image(&self, prompt: &str) -> Result<Vec<u8>> {
        self.0.push(format!("image:{prompt}"));
        let img = image::RgbImage::from_pixel(16, 9, image::Rgb([200, 40, 40]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }
}

struct FakeSpeech {
    name: &'static str,
    log: CallLog,
    fails: Rc<Cell<bool>>,
}

impl SpeechSynthesizer for FakeSpeech {
    fn synthesize(&self, script: &str, lang: &str, out_dir: &Path) -> Result<PathBuf> {
        self.log.push(format!("{}:{lang}:{script}", self.name));
        if self.fails.get() {
            bail!("{} returned 401: unauthorized", self.name);
        }
        let out = out_dir.join(format!("voiceover_{lang}.mp3"));
        std::fs::write(&out, b"ID3")?;
        Ok(out)
    }
}

struct FakeTranscriber {
    log: CallLog,
    fails: Rc<Cell<bool>>,
}

impl Transcriber for FakeTranscriber {
    fn word_timestamps(&self, _audio: &Path, lang: &str, _out_dir: &Path) -> Result<Vec<WordTimestamp>> {
        self.log.push(format!("words:{lang}"));
        if self.fails.get() {
            bail!("whisper not found");
        }
        Ok(vec![
            WordTimestamp::new("Big", 0.0, 0.3),
            WordTimestamp::new("upset", 0.35, 0.8),
            WordTimestamp::new("tonight", 0.85, 1.4),
        ])
    }

    fn srt_fallback(&self, _audio: &Path, lang: &str, out_dir: &Path) -> Result<Option<PathBuf>> {
        self.log.push(format!("srt_fallback:{lang}"));
        let out = out_dir.join(format!("voiceover_{lang}.srt"));
        std::fs::write(&out, "1\n00:00:00,000 --> 00:00:01,400\nBig upset tonight\n")?;
        Ok(Some(out))
    }
}

struct FakeMedia(CallLog);

impl MediaAssembler for FakeMedia {
    fn duration(&self, _media: &Path) -> Result<f64> {
        Ok(12.0)
    }

    fn assemble(&self, request: &AssemblyRequest) -> Result<PathBuf> {
        self.0.push(format!(
            "assemble:frames={}:captions={}:music={}",
            request.frames.len(),
            request.captions.is_some(),
            request.music.is_some()
        ));
        if let Some(parent) = request.output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.output, b"mp4")?;
        Ok(request.output.clone())
    }

    fn overlay_title(&self, image: &Path, title: &str, output: &Path) -> Result<()> {
        self.0.push(format!("overlay:{title}"));
        std::fs::copy(image, output)?;
        Ok(())
    }
}

struct FakeHost(CallLog);

impl VideoHost for FakeHost {
    fn upload(&self, request: &UploadRequest) -> Result<String> {
        self.0.push(format!(
            "upload:{}:{}:captions={}:thumbnail={}",
            request.lang,
            request.title,
            request.captions.is_some(),
            request.thumbnail.is_some()
        ));
        Ok("https://youtu.be/abc123".to_string())
    }
}

struct Harness {
    dir: tempfile::TempDir,
    orch: Orchestrator,
    log: CallLog,
    remote_speech_fails: Rc<Cell<bool>>,
    local_speech_fails: Rc<Cell<bool>>,
    whisper_fails: Rc<Cell<bool>>,
}

impl Harness {
    fn new(with_images: bool) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log = CallLog::default();
        let remote_speech_fails = Rc::new(Cell::new(false));
        let local_speech_fails = Rc::new(Cell::new(false));
        let whisper_fails = Rc::new(Cell::new(false));

        let images: Option<Box<dyn ImageGenerator>> = if with_images {
            Some(Box::new(FakeImages(log.clone())))
        } else {
            None
        };
        let services = Services {
            text: Box::new(FakeText(log.clone())),
            search: Box::new(FakeSearch(log.clone())),
            images,
            speech: Some(Box::new(FakeSpeech {
                name: "remote",
                log: log.clone(),
                fails: remote_speech_fails.clone(),
            })),
            local_speech: Box::new(FakeSpeech {
                name: "local",
                log: log.clone(),
                fails: local_speech_fails.clone(),
            }),
            transcriber: Box::new(FakeTranscriber {
                log: log.clone(),
                fails: whisper_fails.clone(),
            }),
            media: Box::new(FakeMedia(log.clone())),
            host: Box::new(FakeHost(log.clone())),
        };
        let orch = Orchestrator::new(AppPaths::new(dir.path()), services)
            .with_retry(RetryPolicies::none());

        Self {
            dir,
            orch,
            log,
            remote_speech_fails,
            local_speech_fails,
            whisper_fails,
        }
    }

    fn draft(&self) -> PathBuf {
        self.orch.draft("VCT Pacific final", "esports channel").unwrap().0
    }

    fn produce(&self, path: &Path, lang: &str, rerun: Rerun) -> Result<PathBuf> {
        self.orch.produce(
            path,
            &ProduceOptions {
                lang: lang.to_string(),
                script: None,
                rerun,
            },
        )
    }

    fn upload(&self, path: &Path, lang: &str) -> Result<String> {
        self.orch.upload(
            path,
            &UploadOptions {
                lang: lang.to_string(),
                rerun: Rerun::default(),
            },
        )
    }
}

#[test]
fn draft_records_research_and_script() {
    let h = Harness::new(false);
    let path = h.draft();

    let job = JobRecord::load(&path).unwrap();
    assert!(path.starts_with(h.dir.path().join("drafts")));
    assert!(job.ledger.is_done(Stage::Research));
    assert!(job.ledger.is_done(Stage::Draft));
    assert!(job.research.contains("Team wins the final"));
    assert_eq!(job.youtube_title, "The upset nobody saw coming");
    assert_eq!(job.broll_prompts.len(), 2);
    assert_eq!(h.log.count("text"), 1);
}

#[test]
fn redraft_skips_done_stages_unless_asked() {
    let h = Harness::new(false);
    let path = h.draft();

    h.orch.redraft(&path, &Rerun::default()).unwrap();
    assert_eq!(h.log.count("text"), 1);
    assert_eq!(h.log.count("search:"), 1);

    h.orch
        .redraft(&path, &Rerun { force: false, from: Some(Stage::Draft) })
        .unwrap();
    assert_eq!(h.log.count("text"), 2);
    assert_eq!(h.log.count("search:"), 1);
}

#[test]
fn full_run_produces_and_publishes() {
    let h = Harness::new(false);
    let report = h.orch.run("VCT Pacific final", "", "en", false).unwrap();

    let video = report.video.unwrap();
    assert!(video.exists());
    assert_eq!(report.url.as_deref(), Some("https://youtu.be/abc123"));

    let job = JobRecord::load(&report.draft_path).unwrap();
    for stage in Stage::DRAFT.iter().chain(Stage::PRODUCE.iter()) {
        assert!(job.ledger.is_done(*stage), "{stage} not done");
    }
    assert!(job.ledger.is_done(Stage::Upload));
    let outputs = job.outputs("en").unwrap();
    assert_eq!(outputs.video.as_ref(), Some(&video));
    assert_eq!(outputs.youtube_url.as_deref(), Some("https://youtu.be/abc123"));
    let srt = outputs.srt.as_ref().unwrap();
    assert!(srt.exists());
    assert!(std::fs::read_to_string(srt).unwrap().contains("Big upset tonight"));

    assert_eq!(h.log.entries("assemble"), vec!["assemble:frames=2:captions=true:music=false"]);
    assert_eq!(
        h.log.entries("upload"),
        vec!["upload:en:The upset nobody saw coming:captions=true:thumbnail=false"]
    );
}

#[test]
fn dry_run_stops_after_draft() {
    let h = Harness::new(false);
    let report = h.orch.run("VCT Pacific final", "", "en", true).unwrap();
    assert!(report.video.is_none());
    assert!(report.url.is_none());
    assert_eq!(h.log.count("remote"), 0);
    assert_eq!(h.log.count("upload"), 0);
}

#[test]
fn second_produce_reuses_every_stage() {
    let h = Harness::new(false);
    let path = h.draft();

    let first = h.produce(&path, "en", Rerun::default()).unwrap();
    let second = h.produce(&path, "en", Rerun::default()).unwrap();

    assert_eq!(first, second);
    assert_eq!(h.log.count("remote:"), 1);
    assert_eq!(h.log.count("words:"), 1);
    assert_eq!(h.log.count("assemble"), 1);
}

#[test]
fn failed_stage_is_recorded_and_resumed() {
    let h = Harness::new(false);
    let path = h.draft();
    h.remote_speech_fails.set(true);
    h.local_speech_fails.set(true);

    let err = h.produce(&path, "en", Rerun::default()).unwrap_err();
    assert!(format!("{err:#}").contains("local returned 401"));

    let job = JobRecord::load(&path).unwrap();
    assert!(job.ledger.is_done(Stage::Broll));
    let entry = job.ledger.entry(Stage::Voiceover).unwrap();
    assert_eq!(entry.status, StageStatus::Failed);
    assert!(entry.error.as_deref().unwrap().contains("401"));
    assert!(job.ledger.status(Stage::Whisper).is_none());

    let frames_before = job.ledger.entry(Stage::Broll).unwrap().timestamp;
    h.remote_speech_fails.set(false);
    h.local_speech_fails.set(false);
    h.produce(&path, "en", Rerun::default()).unwrap();

    let job = JobRecord::load(&path).unwrap();
    assert_eq!(job.ledger.entry(Stage::Broll).unwrap().timestamp, frames_before);
    assert!(job.ledger.is_done(Stage::Voiceover));
    assert!(job.ledger.is_done(Stage::Assemble));
}

#[test]
fn remote_speech_failure_falls_back_to_local() {
    let h = Harness::new(false);
    let path = h.draft();
    h.remote_speech_fails.set(true);

    h.produce(&path, "en", Rerun::default()).unwrap();
    assert_eq!(h.log.count("remote:"), 1);
    assert_eq!(h.log.count("local:"), 1);
}

#[test]
fn rerun_from_redoes_later_stages_only() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();

    h.produce(&path, "en", Rerun { force: false, from: Some(Stage::Captions) })
        .unwrap();
    assert_eq!(h.log.count("remote:"), 1);
    assert_eq!(h.log.count("words:"), 1);
    assert_eq!(h.log.count("assemble"), 2);
}

#[test]
fn force_redoes_every_produce_stage() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();

    h.produce(&path, "en", Rerun { force: true, from: None }).unwrap();
    assert_eq!(h.log.count("remote:"), 2);
    assert_eq!(h.log.count("words:"), 2);
    assert_eq!(h.log.count("assemble"), 2);
    assert_eq!(h.log.count("text"), 1);
}

#[test]
fn other_language_runs_its_own_stages() {
    let h = Harness::new(false);
    let path = h.draft();

    let en = h.produce(&path, "en", Rerun::default()).unwrap();
    let hi = h.produce(&path, "hi", Rerun::default()).unwrap();

    assert_ne!(en, hi);
    assert_eq!(
        h.log.entries("remote:"),
        vec![
            "remote:en:Big upset tonight. Here is what happened.",
            "remote:hi:Aaj raat bada ulatfer.",
        ]
    );
    let job = JobRecord::load(&path).unwrap();
    assert_eq!(job.ledger.artifact::<String>(Stage::Assemble, "lang").as_deref(), Some("hi"));
    assert_eq!(job.outputs("en").unwrap().video.as_ref(), Some(&en));
    assert_eq!(job.outputs("hi").unwrap().video.as_ref(), Some(&hi));
}

#[test]
fn missing_word_timing_uses_sentence_srt() {
    let h = Harness::new(false);
    let path = h.draft();
    h.whisper_fails.set(true);

    h.produce(&path, "en", Rerun::default()).unwrap();

    assert_eq!(h.log.count("srt_fallback:en"), 1);
    assert_eq!(h.log.entries("assemble"), vec!["assemble:frames=2:captions=false:music=false"]);
    let job = JobRecord::load(&path).unwrap();
    assert_eq!(job.ledger.artifact::<usize>(Stage::Whisper, "word_count"), Some(0));
    assert!(job.outputs("en").unwrap().srt.as_ref().unwrap().exists());
}

#[test]
fn music_track_is_mixed_with_ducking() {
    let h = Harness::new(false);
    let music_dir = h.orch.paths().music_dir();
    std::fs::create_dir_all(&music_dir).unwrap();
    std::fs::write(music_dir.join("calm.mp3"), b"ID3").unwrap();
    let path = h.draft();

    h.produce(&path, "en", Rerun::default()).unwrap();

    assert_eq!(h.log.entries("assemble"), vec!["assemble:frames=2:captions=true:music=true"]);
    let job = JobRecord::load(&path).unwrap();
    let duck: String = job.ledger.artifact(Stage::Music, "duck_filter").unwrap();
    assert!(duck.contains("between(t,"));
}

#[test]
fn upload_without_video_is_refused() {
    let h = Harness::new(false);
    let path = h.draft();

    let err = h.upload(&path, "en").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PipelineError>(),
        Some(PipelineError::MissingVideo { lang }) if lang == "en"
    ));
    assert_eq!(h.log.count("upload"), 0);
}

#[test]
fn thumbnail_failure_does_not_block_upload() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();

    let url = h.upload(&path, "en").unwrap();
    assert_eq!(url, "https://youtu.be/abc123");

    let job = JobRecord::load(&path).unwrap();
    assert!(job.ledger.is_failed(Stage::Thumbnail));
    assert!(job.ledger.is_done(Stage::Upload));
    assert_eq!(job.outputs("en").unwrap().youtube_url.as_deref(), Some(url.as_str()));
}

#[test]
fn thumbnail_is_generated_and_attached() {
    let h = Harness::new(true);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();

    h.upload(&path, "en").unwrap();

    assert_eq!(
        h.log.entries("image:16:9"),
        vec!["image:16:9 landscape, a trophy under stadium lights"]
    );
    assert_eq!(h.log.entries("overlay"), vec!["overlay:The upset nobody saw coming"]);
    assert!(h.log.entries("upload")[0].ends_with("thumbnail=true"));

    let job = JobRecord::load(&path).unwrap();
    let thumb: PathBuf = job.ledger.artifact(Stage::Thumbnail, "path").unwrap();
    assert!(thumb.ends_with(format!("thumb_{}.png", job.job_id)));
    assert!(thumb.exists());
}

#[test]
fn completed_upload_is_not_repeated() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();

    h.upload(&path, "en").unwrap();
    h.upload(&path, "en").unwrap();
    assert_eq!(h.log.count("upload"), 1);
}

#[test]
fn published_language_is_not_uploaded_again_after_another() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();
    h.produce(&path, "hi", Rerun::default()).unwrap();

    h.upload(&path, "en").unwrap();
    h.upload(&path, "hi").unwrap();
    let url = h.upload(&path, "en").unwrap();

    assert_eq!(url, "https://youtu.be/abc123");
    assert_eq!(h.log.count("upload:en"), 1);
    assert_eq!(h.log.count("upload:hi"), 1);
}

#[test]
fn forced_upload_publishes_again() {
    let h = Harness::new(false);
    let path = h.draft();
    h.produce(&path, "en", Rerun::default()).unwrap();
    h.upload(&path, "en").unwrap();

    h.orch
        .upload(
            &path,
            &UploadOptions {
                lang: "en".to_string(),
                rerun: Rerun { force: true, from: None },
            },
        )
        .unwrap();
    assert_eq!(h.log.count("upload:en"), 2);
}
