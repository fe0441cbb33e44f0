use anyhow::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

use crate::pipeline::RunReport;
use crate::state::{JobRecord, Stage, StageStatus};
use crate::topics::TopicCandidate;

/// Pretty JSON on stdout, newline-terminated.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn draft_view(job: &JobRecord, path: &Path) -> Value {
    json!({
        "draft_path": path,
        "job_id": job.job_id,
        "title": job.title(),
        "job": job,
    })
}

pub fn run_view(report: &RunReport) -> Value {
    json!({
        "draft_path": report.draft_path,
        "video": report.video,
        "url": report.url,
        "dry_run": report.video.is_none(),
    })
}

pub fn topics_view(topics: &[TopicCandidate]) -> Value {
    json!({
        "total": topics.len(),
        "topics": topics,
    })
}

/// Every stage in pipeline order with its state, plus per-language outputs.
pub fn status_view(job: &JobRecord) -> Value {
    let stages: Vec<Value> = Stage::ALL
        .iter()
        .map(|stage| {
            let entry = job.ledger.entry(*stage);
            let status = match entry.map(|e| e.status) {
                Some(StageStatus::Done) => "done",
                Some(StageStatus::Failed) => "failed",
                None => "pending",
            };
            json!({
                "stage": stage,
                "status": status,
                "timestamp": entry.map(|e| e.timestamp),
                "error": entry.and_then(|e| e.error.as_deref()),
                "lang": job.ledger.artifact::<String>(*stage, "lang"),
            })
        })
        .collect();

    json!({
        "job_id": job.job_id,
        "news": job.news,
        "title": job.title(),
        "stages": stages,
        "outputs": job.outputs,
    })
}
