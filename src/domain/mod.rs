//! Domain types for Workloop
//!
//! Core data structures:
//! - [`LoopConfig`] - immutable per-run configuration
//! - [`IterationStats`] / [`CumulativeStats`] - telemetry records
//! - [`LoopStatus`] / [`LoopState`] - lifecycle status and persisted snapshot

mod config;
mod state;
mod stats;

pub use config::{LoopConfig, MAX_NAME_LEN, is_valid_name, validate_name};
pub use state::{LoopState, LoopStatus};
pub use stats::{CumulativeStats, IterationStats};
