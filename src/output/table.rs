use unicode_width::UnicodeWidthStr;

use crate::state::{JobRecord, Stage, StageStatus};
use crate::topics::TopicCandidate;

/// Truncate a string to fit within max_width (respecting unicode width).
pub fn truncate(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    let mut result = String::new();
    let mut width = 0;
    for ch in s.chars() {
        let cw = unicode_width::UnicodeWidthChar::width(ch).unwrap_or(0);
        if width + cw + 3 > max_width {
            result.push_str("...");
            break;
        }
        result.push(ch);
        width += cw;
    }
    result
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Ranked topic list for `shortreel topics`.
pub fn print_topics(topics: &[TopicCandidate]) {
    if topics.is_empty() {
        println!("No topics found from enabled sources.");
        return;
    }

    println!("Trending topics ({} found):\n", topics.len());
    println!("  {:>3}  {:<24} {:<52} {:>5}", "#", "SOURCE", "TITLE", "SCORE");
    println!("  {}", "-".repeat(88));

    for (i, t) in topics.iter().enumerate() {
        println!(
            "  {:>3}  {:<24} {:<52} {:>5.2}",
            i + 1,
            truncate(&t.source, 24),
            truncate(&t.title, 52),
            t.trending_score,
        );
        if !t.summary.trim().is_empty() {
            let summary = t.summary.replace('\n', " ");
            println!("       {}", truncate(summary.trim(), 80));
        }
    }
}

/// Numbered list shown before an interactive pick.
pub fn print_topic_menu(topics: &[TopicCandidate]) {
    println!("\nTrending topics:\n");
    for (i, t) in topics.iter().enumerate() {
        println!("  {:>2}. [{}] {}", i + 1, t.source, truncate(&t.title, 72));
    }
}

/// Script, title and b-roll prompts of a fresh draft.
pub fn print_draft_summary(job: &JobRecord, path: &std::path::Path) {
    println!("Draft saved: {}", path.display());
    println!("  Job:    {}", job.job_id);
    println!("  Topic:  {}", job.news);
    println!("  Title:  {}", job.title());
    if !job.youtube_tags.is_empty() {
        println!("  Tags:   {}", truncate(&job.youtube_tags, 72));
    }

    println!("\nScript:");
    for line in job.script.lines() {
        println!("  {line}");
    }

    if !job.broll_prompts.is_empty() {
        println!("\nB-roll prompts:");
        for (i, p) in job.broll_prompts.iter().enumerate() {
            println!("  {}. {}", i + 1, truncate(p, 76));
        }
    }
}

/// Ledger and outputs for `shortreel status`.
pub fn print_status(job: &JobRecord) {
    println!("Job {}: {}", job.job_id, truncate(job.title(), 60));
    println!("  Created: {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));

    let done = Stage::ALL
        .iter()
        .filter(|s| job.ledger.is_done(**s))
        .count();
    println!("\nStages ({done}/{} done):", Stage::ALL.len());
    println!("{}", job.ledger.summary());

    for stage in Stage::ALL {
        if let Some(entry) = job.ledger.entry(stage) {
            if entry.status == StageStatus::Failed {
                let error = entry.error.as_deref().unwrap_or("unknown error");
                println!("  {stage} failed at {}: {}", entry.timestamp.format("%Y-%m-%d %H:%M"), truncate(error, 60));
            }
        }
    }

    if job.outputs.is_empty() {
        return;
    }
    println!("\nOutputs ({} language{}):", job.outputs.len(), plural(job.outputs.len()));
    for (lang, out) in &job.outputs {
        println!("  [{lang}]");
        if let Some(video) = &out.video {
            println!("    Video: {}", video.display());
        }
        if let Some(srt) = &out.srt {
            println!("    SRT:   {}", srt.display());
        }
        if let Some(url) = &out.youtube_url {
            println!("    URL:   {url}");
        }
    }
}
