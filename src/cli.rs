//! CLI command definitions and subcommands

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Workloop - iterative agent loop driver
#[derive(Parser)]
#[command(
    name = "workloop",
    about = "Drive an agent worker through durable, telemetered iterations",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// Root directory for loop state (default: ~/.workloop/loops)
    #[arg(long, global = true)]
    pub loops_root: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a loop until it completes, stops, or fails
    Run {
        /// Loop name (also the loop directory name)
        #[arg(value_name = "NAME")]
        name: String,

        /// Task file, relative to the working directory
        #[arg(short, long, default_value = "TASK.md")]
        task_file: String,

        /// Directory the worker runs in (default: current directory)
        #[arg(short, long)]
        working_dir: Option<PathBuf>,

        /// Maximum iterations (0 = unlimited)
        #[arg(short, long, default_value = "0")]
        max_iterations: u32,

        /// Worker executable
        #[arg(long, default_value = "agent")]
        worker: String,

        /// Extra argument passed to the worker (repeatable)
        #[arg(long = "worker-arg", value_name = "ARG", allow_hyphen_values = true)]
        worker_args: Vec<String>,

        /// Model override, passed to the worker as --model
        #[arg(long)]
        model: Option<String>,

        /// Provider override, passed to the worker as --provider
        #[arg(long)]
        provider: Option<String>,

        /// Thinking level override, passed to the worker as --thinking
        #[arg(long)]
        thinking: Option<String>,

        /// Replace every Nth prompt with a reflection instruction (0 = off)
        #[arg(long, default_value = "0")]
        reflect_every: u32,
    },

    /// List loop directories and their last known state
    List {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the persisted state of one loop
    Status {
        /// Loop name
        name: String,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete loop directories that reached a terminal state
    Clean {
        /// Delete every loop directory, terminal or not
        #[arg(long)]
        all: bool,
    },
}

/// Output format for list/status commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
