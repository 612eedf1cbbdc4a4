//! Operator CLI for inspecting and adjusting stored SecLab progress.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;

use seclab_lib::commands::progress;
use seclab_lib::config::{self, ProgressConfig};
use seclab_lib::engine::{ActivityResult, ModuleStatus};
use seclab_lib::logging::init_logging;
use seclab_lib::ProgressState;

#[derive(Parser)]
#[command(name = "seclab-progress")]
#[command(about = "Inspect and adjust SecLab learner progress")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "SECLAB_LOG")]
    log_level: Option<String>,

    /// Directory holding the progress document. Defaults to ~/.seclab
    #[arg(long, global = true, env = "SECLAB_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Base URL of the remote progress service
    #[arg(long, global = true, env = "SECLAB_REMOTE_URL")]
    remote_url: Option<String>,

    /// Ignore any configured remote service
    #[arg(long, global = true)]
    offline: bool,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the learner profile
    Status,
    /// List modules with their lock state
    Modules,
    /// List achievements and which are earned
    Achievements,
    /// Record a finished activity
    Record {
        /// Module id, e.g. A01
        module: String,
        /// documentation, animation, lab or quiz
        activity: String,
        #[arg(long, default_value_t = 0)]
        score: u8,
        /// Time spent in seconds
        #[arg(long, default_value_t = 0)]
        time: u64,
    },
    /// Award bonus XP
    Award {
        xp: u64,
        #[arg(long, default_value = "manual award")]
        reason: String,
    },
    /// Delete stored progress and start over
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },
    /// Print the effective configuration
    Config,
}

fn effective_config(cli: &Cli) -> ProgressConfig {
    let mut config = config::load_config().with_env_overrides();
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.to_string_lossy().to_string();
    }
    if let Some(url) = &cli.remote_url {
        config.remote_base_url = Some(url.clone());
    }
    if cli.offline {
        config.remote_base_url = None;
    }
    config
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn status(state: &ProgressState, json: bool) -> anyhow::Result<()> {
    let doc = progress::get_progress(state).await?;
    if json {
        return print_json(&doc);
    }
    let p = &doc.user_profile;
    println!("{} (level {})", p.name, p.level);
    println!("  XP      {}/{} (total {})", p.current_xp, p.next_level_xp, p.total_xp);
    println!("  Streak  {} days (longest {})", p.streak_days, p.longest_streak);
    println!(
        "  Modules {}/{} completed",
        doc.completed_module_ids.len(),
        seclab_lib::model::ModuleId::ALL.len()
    );
    println!("  Badges  {}", p.badges_earned.len());
    Ok(())
}

async fn modules(state: &ProgressState, json: bool) -> anyhow::Result<()> {
    let summary = progress::get_module_summary(state).await?;
    if json {
        return print_json(&summary);
    }
    for m in &summary.modules {
        let mark = match m.status {
            ModuleStatus::Completed => "done",
            ModuleStatus::Unlocked => "open",
            ModuleStatus::Locked => "lock",
        };
        let next = m
            .next_activity
            .map(|a| format!(" next: {a}"))
            .unwrap_or_default();
        println!("[{mark}] {} {} ({}/4){next}", m.module_id, m.title, m.activities_completed);
    }
    println!(
        "{} completed, {} unlocked, {} total",
        summary.completed, summary.unlocked, summary.total
    );
    Ok(())
}

async fn achievements(state: &ProgressState, json: bool) -> anyhow::Result<()> {
    let list = progress::list_achievements(state).await?;
    if json {
        return print_json(&list);
    }
    for status in &list {
        let a = &status.achievement;
        let mark = if status.earned { "x" } else { " " };
        println!("[{mark}] {} {} (+{} XP) {}", a.icon, a.name, a.xp_reward, a.description);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = effective_config(&cli);
    init_logging(&config.log_level);

    if let Commands::Config = cli.command {
        let mut shown = config.clone();
        if shown.auth_token.is_some() {
            shown.auth_token = Some("********".into());
        }
        if !cli.json {
            if let Some(path) = config::config_path() {
                eprintln!("# {}", path.display());
            }
        }
        return print_json(&shown);
    }

    let state = seclab_lib::start(&config)
        .await
        .context("Failed to start progress engine")?;

    match cli.command {
        Commands::Status => status(&state, cli.json).await?,
        Commands::Modules => modules(&state, cli.json).await?,
        Commands::Achievements => achievements(&state, cli.json).await?,
        Commands::Record {
            module,
            activity,
            score,
            time,
        } => {
            let result = ActivityResult {
                score,
                time_spent_seconds: time,
            };
            let outcome = progress::record_activity(module, activity, result, &state).await?;
            if cli.json {
                print_json(&outcome)?;
            } else if outcome.already_completed {
                println!("{} {} was already completed", outcome.module_id, outcome.activity);
            } else {
                let xp = outcome.xp.as_ref().map(|x| x.total).unwrap_or_default();
                println!("{} {} recorded: +{xp} XP", outcome.module_id, outcome.activity);
                for event in &outcome.events {
                    println!("  {}", serde_json::to_string(event)?);
                }
            }
        }
        Commands::Award { xp, reason } => {
            let change = progress::award_xp(xp, reason, &state).await?;
            if cli.json {
                print_json(&change)?;
            } else if change.leveled_up() {
                println!("Level up: {} -> {}", change.previous_level, change.new_level);
            } else {
                println!("Awarded {xp} XP");
            }
        }
        Commands::Reset { yes } => {
            if !yes {
                bail!("Refusing to reset progress without --yes");
            }
            progress::reset_progress(&state).await?;
            println!("Progress reset");
        }
        Commands::Config => {}
    }

    state.engine.lock().await.flush().await;
    Ok(())
}
