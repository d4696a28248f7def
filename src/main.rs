//! Workloop - iterative agent loop driver
//!
//! CLI entry point for running and inspecting loops.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use workloop::cli::{Cli, Command, OutputFormat};
use workloop::domain::{IterationStats, LoopConfig, LoopStatus};
use workloop::r#loop::{LoopEngine, LoopObserver};
use workloop::state::{self, clean_loops, default_loops_root, list_loops};
use workloop::worker::WorkerEvent;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    let level = match cli_log_level.map(str::to_uppercase).as_deref() {
        Some("TRACE") => tracing::Level::TRACE,
        Some("DEBUG") => tracing::Level::DEBUG,
        Some("INFO") | None => tracing::Level::INFO,
        Some("WARN") | Some("WARNING") => tracing::Level::WARN,
        Some("ERROR") => tracing::Level::ERROR,
        Some(other) => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let loops_root = cli.loops_root.clone().unwrap_or_else(default_loops_root);
    debug!(loops_root = %loops_root.display(), "main: resolved loops root");

    match cli.command {
        Command::Run {
            name,
            task_file,
            working_dir,
            max_iterations,
            worker,
            worker_args,
            model,
            provider,
            thinking,
            reflect_every,
        } => {
            debug!(%name, "main: matched Run command");
            let working_dir = match working_dir {
                Some(dir) => dir,
                None => std::env::current_dir().context("Failed to get current directory")?,
            };

            let mut config = LoopConfig::new(name, working_dir);
            config.task_file = task_file;
            config.max_iterations = max_iterations;
            config.worker_command = worker;
            config.worker_args = worker_args;
            config.model = model;
            config.provider = provider;
            config.thinking_level = thinking;
            config.reflect_every = reflect_every;

            cmd_run(config, loops_root).await
        }
        Command::List { format } => {
            debug!(?format, "main: matched List command");
            cmd_list(&loops_root, format)
        }
        Command::Status { name, format } => {
            debug!(%name, ?format, "main: matched Status command");
            cmd_status(&loops_root, &name, format)
        }
        Command::Clean { all } => {
            debug!(all, "main: matched Clean command");
            cmd_clean(&loops_root, all)
        }
    }
}

/// Observer that prints loop progress to the console
struct ConsoleObserver;

impl LoopObserver for ConsoleObserver {
    fn on_event(&self, event: &WorkerEvent) {
        debug!(kind = event.kind(), "worker event");
    }

    fn on_iteration_start(&self, iteration: u32) {
        println!("Iteration {} started", iteration);
    }

    fn on_iteration_end(&self, stats: &IterationStats) {
        println!(
            "Iteration {} finished in {:.1}s ({} turns, {} in / {} out tokens, ${:.4})",
            stats.iteration,
            stats.duration_ms as f64 / 1000.0,
            stats.turns,
            stats.input_tokens,
            stats.output_tokens,
            stats.cost_usd,
        );
    }

    fn on_status(&self, status: LoopStatus, error: Option<&str>) {
        if let Some(error) = error {
            eprintln!("Loop entered {} state: {}", status, error);
        }
    }
}

/// Run a loop to a terminal state
async fn cmd_run(config: LoopConfig, loops_root: PathBuf) -> Result<()> {
    println!("Running loop '{}'", config.name);
    println!("  Task file: {}", config.task_path().display());
    println!("  Worker: {}", config.worker_command);
    if config.max_iterations > 0 {
        println!("  Max iterations: {}", config.max_iterations);
    }
    println!();

    let mut engine = LoopEngine::new(config, loops_root, Arc::new(ConsoleObserver))?;
    let handle = engine.handle();

    // First Ctrl+C requests a graceful stop; a second one kills the worker.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nStop requested; finishing the current iteration (Ctrl+C again to kill)");
        handle.stop();
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        eprintln!("\nKilling worker");
        handle.kill();
    });

    let status = engine.start().await?;
    let state = engine.handle().state();

    match status {
        LoopStatus::Completed => {
            println!(
                "\n✓ Loop completed after {} iterations (${:.4} total)",
                state.cumulative.iterations, state.cumulative.cost_usd
            );
        }
        LoopStatus::Stopped => {
            println!(
                "\n⚠ Loop stopped after {} iterations",
                state.cumulative.iterations
            );
        }
        LoopStatus::Error => {
            println!(
                "\n✗ Loop failed: {}",
                state.error.as_deref().unwrap_or("unknown error")
            );
            std::process::exit(1);
        }
        other => {
            println!("\nLoop ended in unexpected status: {}", other);
        }
    }

    Ok(())
}

fn colorize_status(status: LoopStatus) -> colored::ColoredString {
    let text = status.to_string();
    match status {
        LoopStatus::Running | LoopStatus::Starting => text.green(),
        LoopStatus::Completed => text.blue(),
        LoopStatus::Stopped => text.yellow(),
        LoopStatus::Error => text.red(),
    }
}

/// List loop directories
fn cmd_list(loops_root: &PathBuf, format: OutputFormat) -> Result<()> {
    let entries = list_loops(loops_root).context("Failed to scan loops directory")?;

    match format {
        OutputFormat::Json => {
            let json: Vec<_> = entries
                .iter()
                .map(|entry| {
                    serde_json::json!({
                        "name": entry.name,
                        "state": entry.state,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No loops found under {}", loops_root.display());
                return Ok(());
            }

            println!("{:<30} {:<12} {:<10} {:<25}", "NAME", "STATUS", "ITERS", "UPDATED");
            println!("{}", "-".repeat(80));
            for entry in entries {
                match entry.state {
                    Some(state) => println!(
                        "{:<30} {:<12} {:<10} {:<25}",
                        entry.name,
                        colorize_status(state.status),
                        state.cumulative.iterations,
                        state.updated_at.to_rfc3339(),
                    ),
                    None => println!("{:<30} {:<12}", entry.name, "-"),
                }
            }
        }
    }

    Ok(())
}

/// Show one loop's persisted state
fn cmd_status(loops_root: &PathBuf, name: &str, format: OutputFormat) -> Result<()> {
    let state_path = loops_root.join(name).join("state.json");
    let state = match state::read_state(&state_path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("No state for loop '{}': {}", name, e);
            std::process::exit(1);
        }
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        OutputFormat::Text => {
            println!("Loop: {}", name);
            println!("Status: {}", colorize_status(state.status));
            println!("Iteration: {}", state.iteration);
            println!("Turns: {}", state.cumulative.turns);
            println!(
                "Tokens: {} in / {} out",
                state.cumulative.input_tokens, state.cumulative.output_tokens
            );
            println!("Cost: ${:.4}", state.cumulative.cost_usd);
            println!("Started: {}", state.started_at.to_rfc3339());
            println!("Updated: {}", state.updated_at.to_rfc3339());
            if let Some(error) = &state.error {
                println!("Error: {}", error.red());
            }
            if let Some(pid) = state.worker_pid {
                println!("Worker PID: {}", pid);
            }
        }
    }

    Ok(())
}

/// Delete terminal loop directories
fn cmd_clean(loops_root: &PathBuf, all: bool) -> Result<()> {
    let removed = clean_loops(loops_root, all).context("Failed to clean loops directory")?;

    if removed.is_empty() {
        println!("Nothing to clean");
    } else {
        for name in &removed {
            println!("Removed {}", name);
        }
        println!("Cleaned {} loop(s)", removed.len());
    }

    Ok(())
}
