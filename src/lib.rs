//! Workloop - iterative agent loop driver
//!
//! Workloop drives a long-lived worker process through repeated
//! iterations: each iteration sends the task prompt, waits for the worker
//! to signal the turn finished, records telemetry, persists progress
//! durably, and resets the worker's context before the next iteration.
//! An operator can inject a message mid-iteration (nudge), queue a
//! replacement prompt for the next iteration (follow-up), and request
//! graceful or immediate termination at any time.
//!
//! # Core Concepts
//!
//! - **Fresh Context Always**: a context reset between iterations keeps
//!   the worker from accumulating stale conversation
//! - **State in Files**: progress persists in the loop directory, not in
//!   process memory; the state file is replaced atomically so pollers
//!   never see a partial write
//! - **Best-Effort Control**: nudges and stop requests are signals, not
//!   guaranteed-delivery commands; an in-flight iteration always runs to
//!   completion (or failure) before a graceful stop takes effect
//!
//! # Modules
//!
//! - [`domain`] - configuration, stats, and state snapshot types
//! - [`worker`] - worker process handle and wire protocol
//! - [`events`] - worker output stream reader and event log
//! - [`r#loop`] - the loop engine, control surface, and telemetry
//! - [`state`] - on-disk layout and atomic persistence

pub mod cli;
pub mod domain;
pub mod error;
pub mod events;
pub mod state;
pub mod worker;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use domain::{CumulativeStats, IterationStats, LoopConfig, LoopState, LoopStatus};
pub use error::LoopError;
pub use r#loop::{LoopEngine, LoopHandle, LoopObserver, NoopObserver, TelemetryAccumulator};
pub use state::{LoopEntry, LoopPaths, clean_loops, default_loops_root, list_loops};
pub use worker::{TurnUsage, WorkerCommand, WorkerEvent, WorkerExit, WorkerHandle};
