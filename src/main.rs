use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shortreel::config::{self, AppConfig, AppPaths};
use shortreel::logging;
use shortreel::output::{json as json_out, table};
use shortreel::pipeline::{Orchestrator, ProduceOptions, Rerun, Services, UploadOptions};
use shortreel::state::{JobRecord, Stage};
use shortreel::topics::{self, TopicEngine};
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "shortreel", version, about = "Turn a one-line topic into a captioned vertical short and publish it")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Debug logging on the console
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Data directory (default: ~/.shortreel)
    #[arg(long, global = true, env = "SHORTREEL_HOME")]
    home: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Research a topic and generate script + metadata
    Draft {
        /// Topic or news headline
        #[arg(long, required_unless_present = "discover", conflicts_with = "discover")]
        news: Option<String>,

        /// Pick from trending topics instead of --news
        #[arg(long)]
        discover: bool,

        /// Let the text generator choose among discovered topics
        #[arg(long, requires = "discover")]
        auto_pick: bool,

        /// Channel context for the script prompt
        #[arg(long, default_value = "")]
        context: String,
    },

    /// Render the video for a draft
    Produce {
        /// Path to the draft JSON
        #[arg(long)]
        draft: PathBuf,

        /// Output language
        #[arg(long, default_value = "en", value_parser = ["en", "hi"])]
        lang: String,

        /// Narrate this text instead of the draft's script
        #[arg(long)]
        script: Option<String>,

        /// Redo every stage
        #[arg(long)]
        force: bool,

        /// Redo this stage and everything after it
        #[arg(long)]
        from: Option<Stage>,
    },

    /// Publish a produced video
    Upload {
        /// Path to the draft JSON
        #[arg(long)]
        draft: PathBuf,

        /// Output language
        #[arg(long, default_value = "en", value_parser = ["en", "hi"])]
        lang: String,

        /// Re-upload even if already done
        #[arg(long)]
        force: bool,

        /// Redo this stage and everything after it
        #[arg(long)]
        from: Option<Stage>,
    },

    /// Full pipeline: draft, produce, upload
    Run {
        /// Topic or news headline
        #[arg(long, required_unless_present = "discover", conflicts_with = "discover")]
        news: Option<String>,

        /// Pick from trending topics instead of --news
        #[arg(long)]
        discover: bool,

        /// Let the text generator choose among discovered topics
        #[arg(long, requires = "discover")]
        auto_pick: bool,

        /// Output language
        #[arg(long, default_value = "en", value_parser = ["en", "hi"])]
        lang: String,

        /// Channel context for the script prompt
        #[arg(long, default_value = "")]
        context: String,

        /// Stop after the draft
        #[arg(long)]
        dry_run: bool,
    },

    /// Discover trending topics
    Topics {
        /// Maximum topics to show
        #[arg(long, default_value = "15")]
        limit: usize,
    },

    /// Show the stage ledger and outputs of a draft
    Status {
        /// Path to the draft JSON
        #[arg(long)]
        draft: PathBuf,
    },

    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented default config.toml
    Init,
    /// Print the effective config with secrets redacted
    Show,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let json_output = cli.json;
    let paths = AppPaths::resolve(cli.home)?;
    let _log_guard = logging::init(&paths.logs_dir(), cli.verbose)?;
    let config = AppConfig::load(&paths)?;

    match cli.command {
        Commands::Draft {
            news,
            discover,
            auto_pick,
            context,
        } => {
            let orch = orchestrator(&config, &paths)?;
            let news = resolve_news(&orch, &config, news, discover, auto_pick)?;
            let (path, job) = orch.draft(&news, &context)?;
            if json_output {
                json_out::print_json(&json_out::draft_view(&job, &path))?;
            } else {
                table::print_draft_summary(&job, &path);
            }
        }

        Commands::Produce {
            draft,
            lang,
            script,
            force,
            from,
        } => {
            let orch = orchestrator(&config, &paths)?;
            let opts = ProduceOptions {
                lang,
                script,
                rerun: Rerun { force, from },
            };
            let video = orch.produce(&draft, &opts)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "video": video }))?;
            } else {
                println!("Video: {}", video.display());
            }
        }

        Commands::Upload {
            draft,
            lang,
            force,
            from,
        } => {
            let orch = orchestrator(&config, &paths)?;
            let opts = UploadOptions {
                lang,
                rerun: Rerun { force, from },
            };
            let url = orch.upload(&draft, &opts)?;
            if json_output {
                json_out::print_json(&serde_json::json!({ "url": url }))?;
            } else {
                println!("Live: {url}");
            }
        }

        Commands::Run {
            news,
            discover,
            auto_pick,
            lang,
            context,
            dry_run,
        } => {
            let orch = orchestrator(&config, &paths)?;
            let news = resolve_news(&orch, &config, news, discover, auto_pick)?;
            let report = orch.run(&news, &context, &lang, dry_run)?;
            if json_output {
                json_out::print_json(&json_out::run_view(&report))?;
            } else {
                println!("Draft: {}", report.draft_path.display());
                match (&report.video, &report.url) {
                    (Some(video), Some(url)) => {
                        println!("Video: {}", video.display());
                        println!("Done! {url}");
                    }
                    _ => println!("Dry run - skipped produce and upload"),
                }
            }
        }

        Commands::Topics { limit } => {
            let candidates = TopicEngine::from_config(&config).discover(limit);
            if json_output {
                json_out::print_json(&json_out::topics_view(&candidates))?;
            } else {
                table::print_topics(&candidates);
            }
        }

        Commands::Status { draft } => {
            let job = JobRecord::load(&draft)?;
            if json_output {
                json_out::print_json(&json_out::status_view(&job))?;
            } else {
                table::print_status(&job);
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init => {
                let path = paths.config_file();
                if config::init_config(&paths)? {
                    println!("Created {}", path.display());
                } else {
                    println!("Config already exists: {}", path.display());
                }
            }
            ConfigAction::Show => {
                let redacted = config.display_redacted();
                if json_output {
                    json_out::print_json(&serde_json::json!({
                        "config_file": paths.config_file(),
                        "exists": paths.config_file().exists(),
                        "config": redacted,
                    }))?;
                } else {
                    println!("# {}", paths.config_file().display());
                    println!("{redacted}");
                }
            }
        },
    }

    Ok(())
}

fn orchestrator(config: &AppConfig, paths: &AppPaths) -> Result<Orchestrator> {
    Ok(Orchestrator::new(paths.clone(), Services::from_config(config, paths)?))
}

/// The topic to draft: `--news`, or one chosen from discovered topics.
fn resolve_news(
    orch: &Orchestrator,
    config: &AppConfig,
    news: Option<String>,
    discover: bool,
    auto_pick: bool,
) -> Result<String> {
    if !discover {
        return match news.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => Ok(n),
            _ => bail!("--news or --discover required"),
        };
    }

    let candidates = TopicEngine::from_config(config).discover(topics::DEFAULT_LIMIT);
    if candidates.is_empty() {
        bail!("No trending topics found. Use --news instead.");
    }

    if auto_pick {
        let pick = topics::auto_pick(&candidates, orch.text_generator())?;
        eprintln!("Auto-picked: {pick}");
        return Ok(pick);
    }

    table::print_topic_menu(&candidates);
    eprint!("\nPick a number (or enter a custom topic): ");
    std::io::stderr().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim();

    match answer.parse::<usize>() {
        Ok(n) if (1..=candidates.len()).contains(&n) => Ok(candidates[n - 1].title.clone()),
        _ if !answer.is_empty() => Ok(answer.to_string()),
        _ => bail!("No topic chosen"),
    }
}
