// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod logsink;
pub mod schedule;
pub mod script;
pub mod store;
pub mod types;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::Engine;
use crate::logsink::{LogManager, LogNotification};
use crate::schedule::StartupDecision;
use crate::schedule::lifecycle::classify_startup;
use crate::store::{MemoryStore, RecordStore};
use crate::types::ExecutionStatus;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, seeds an in-memory record store from its `[script.*]`
/// tables and dispatches the subcommand.
pub async fn run(args: CliArgs) -> Result<ExitCode> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("failed to load config {}", config_path.display()))?;

    match args.command {
        Command::Serve => serve(cfg).await.map(|()| ExitCode::SUCCESS),
        Command::Run { name } => run_once(cfg, &name).await,
        Command::Logs { date, script } => {
            print_logs(&cfg, date, script.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Dates => {
            let logs = LogManager::new(&cfg.engine.logs_dir)?;
            for date in logs.available_dates().await? {
                println!("{date}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => {
            print_plan(&cfg);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn build_engine(cfg: &ConfigFile) -> Result<Engine> {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::from_configs(cfg.scripts.clone()));
    Ok(Engine::new(&cfg.engine, store)?)
}

/// Start the scheduler and echo every script log line until Ctrl-C.
async fn serve(cfg: ConfigFile) -> Result<()> {
    let engine = build_engine(&cfg)?;
    let mut live = engine.subscribe_logs(None);

    engine.start().await?;
    info!(scripts = cfg.scripts.len(), "serving; press Ctrl-C to stop");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for Ctrl-C; shutting down");
                }
                break;
            }
            Some(notification) = live.recv() => print_notification(&notification),
        }
    }

    engine.shutdown().await;
    Ok(())
}

/// Run one script in the foreground, echoing its log lines.
async fn run_once(cfg: ConfigFile, name: &str) -> Result<ExitCode> {
    let script = cfg
        .script_by_name(name)
        .ok_or_else(|| anyhow!("no script named '{name}' in config"))?;
    let engine = build_engine(&cfg)?;
    let mut live = engine.subscribe_logs(Some(script.id));

    let run = engine.run_script(script.id);
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            res = &mut run => break res,
            Some(notification) = live.recv() => print_notification(&notification),
        }
    };
    while let Ok(notification) = live.try_recv() {
        print_notification(&notification);
    }

    let execution = result?;
    println!(
        "{} {} (exit_code={})",
        execution.script_name,
        execution.status.as_str(),
        execution.exit_code.map_or_else(|| "-".to_string(), |c| c.to_string())
    );
    Ok(match execution.status {
        ExecutionStatus::Success => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

async fn print_logs(cfg: &ConfigFile, date: Option<NaiveDate>, script: Option<&str>) -> Result<()> {
    let logs = LogManager::new(&cfg.engine.logs_dir)?;
    for entry in logs.read_logs(date, script).await? {
        println!("{}", entry.to_line());
    }
    Ok(())
}

fn print_notification(n: &LogNotification) {
    println!("{}|{}|{}|{}", n.timestamp, n.script_name, n.level, n.message);
}

/// Print the scripts and what the startup sweep would do with each.
fn print_plan(cfg: &ConfigFile) {
    let now = Utc::now();
    println!("script-launcher check");
    println!("  engine.logs_dir = {}", cfg.engine.logs_dir.display());
    println!(
        "  engine.interpreter = {}",
        cfg.engine.interpreter().as_deref().unwrap_or("(none, run path directly)")
    );
    println!();

    println!("scripts ({}):", cfg.scripts.len());
    for script in &cfg.scripts {
        println!("  - [{}] {}", script.id, script.name);
        println!("      path: {}", script.path);
        if !script.is_active {
            println!("      inactive");
            continue;
        }
        match classify_startup(script, now) {
            StartupDecision::Repeat { pending_one_shot } => {
                println!("      repeat: every {}", script.interval_label());
                if !script.weekdays.is_every_day() {
                    let days: Vec<_> = script.weekdays.days().collect();
                    println!("      weekdays: {days:?}");
                }
                if let Some(at) = pending_one_shot {
                    println!("      first run at: {at}");
                }
            }
            StartupDecision::FutureOneShot(at) => println!("      once at: {at}"),
            StartupDecision::ExpiredOneShot(at) => {
                println!("      expired one-time start ({at}); will be deactivated")
            }
            StartupDecision::Unscheduled => {
                println!("      no schedule; will be deactivated")
            }
        }
    }
}
