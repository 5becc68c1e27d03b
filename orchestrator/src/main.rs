//! Orchestrator CLI.
//!
//! Runs a self-contained demo pipeline and manages the TOML config file.
//! Lifecycle events are printed to stdout as JSON lines.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use orchestrator::demo::{DemoOptions, run_demo};
use orchestrator::exit_codes;
use orchestrator::io::config::{OrchestratorConfig, load_config, write_config};
use orchestrator::logging;
use orchestrator::looping::LoopStop;

#[derive(Parser)]
#[command(
    name = "orchestrator",
    version,
    about = "Step-wise orchestration of autonomous code-change runs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive an in-memory demo run and print its lifecycle events.
    Demo {
        /// Orchestrator config file (defaults apply when missing).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Merge automatically when validation is clean.
        #[arg(long)]
        auto_merge: bool,
        /// Zero-based step whose validation reports a fatal finding.
        #[arg(long)]
        fatal_step: Option<usize>,
        /// Number of steps in the demo run.
        #[arg(long, default_value_t = 2)]
        steps: usize,
    },
    /// Load and validate a config file.
    CheckConfig { path: PathBuf },
    /// Write a default config file.
    InitConfig {
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Demo {
            config,
            auto_merge,
            fatal_step,
            steps,
        } => cmd_demo(config.as_deref(), auto_merge, fatal_step, steps),
        Command::CheckConfig { path } => cmd_check_config(&path),
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

fn cmd_demo(
    config: Option<&Path>,
    auto_merge: bool,
    fatal_step: Option<usize>,
    steps: usize,
) -> Result<i32> {
    let mut config = match config {
        Some(path) => load_config(path)?,
        None => OrchestratorConfig::default(),
    };
    if auto_merge {
        config.merge.auto = true;
    }
    let report = run_demo(&DemoOptions {
        config,
        steps,
        fatal_step,
        ..DemoOptions::default()
    })?;

    let mut stdout = io::stdout().lock();
    for event in &report.events {
        let line = serde_json::to_string(event).context("serialize event")?;
        writeln!(stdout, "{line}").context("write event")?;
    }

    let outcome = &report.outcome;
    eprintln!(
        "run {}: {:?} after {} advance(s)",
        outcome.run_id, outcome.stop, outcome.advances
    );
    Ok(match outcome.stop {
        LoopStop::Completed => exit_codes::OK,
        LoopStop::Paused { .. } => exit_codes::PAUSED,
        LoopStop::StepFailed { .. }
        | LoopStop::RunFailed
        | LoopStop::Stalled
        | LoopStop::MaxAdvancesExceeded { .. } => exit_codes::FAILED,
    })
}

fn cmd_check_config(path: &Path) -> Result<i32> {
    if !path.exists() {
        bail!("config not found: {}", path.display());
    }
    load_config(path)?;
    println!("ok");
    Ok(exit_codes::OK)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &OrchestratorConfig::default())?;
    Ok(exit_codes::OK)
}
