//! Loop status and persisted state snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::LoopConfig;
use super::stats::CumulativeStats;

/// Lifecycle status of a loop run
///
/// `starting → running → {stopped | completed | error}`; the three on the
/// right are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    /// Directory layout prepared, worker not yet confirmed up
    Starting,
    /// Iterations are executing
    Running,
    /// Terminated by an explicit stop or kill request
    Stopped,
    /// Iteration budget exhausted (or natural end) with no stop requested
    Completed,
    /// Unrecoverable failure not caused by an in-flight stop/kill
    Error,
}

impl LoopStatus {
    /// Whether the loop can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Snapshot of a loop's state, persisted to `state.json`
///
/// A projection of the engine's live fields, not a source of truth.
/// `updated_at` is refreshed every time a snapshot is produced and never
/// regresses within a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    /// Current status
    pub status: LoopStatus,

    /// The run's immutable configuration
    pub config: LoopConfig,

    /// Current iteration number (0 before the first iteration starts)
    pub iteration: u32,

    /// Totals across completed iterations
    pub cumulative: CumulativeStats,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When this snapshot was produced
    pub updated_at: DateTime<Utc>,

    /// Error message if status is `error`
    #[serde(default)]
    pub error: Option<String>,

    /// Worker process id while the worker is alive
    #[serde(default)]
    pub worker_pid: Option<u32>,
}

impl LoopState {
    /// Initial snapshot for a freshly configured run
    pub fn initial(config: LoopConfig) -> Self {
        let now = Utc::now();
        Self {
            status: LoopStatus::Starting,
            config,
            iteration: 0,
            cumulative: CumulativeStats::default(),
            started_at: now,
            updated_at: now,
            error: None,
            worker_pid: None,
        }
    }
}
