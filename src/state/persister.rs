//! Durable persistence for loop state and artifacts
//!
//! The state file is replaced with a write-to-temp-then-rename so any
//! concurrent reader of `state.json` sees either the old document or the
//! new one, never a partial write. External processes poll that file to
//! report progress, which makes the rename the load-bearing step: a
//! plain truncate-and-write would expose half-written JSON.

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::domain::{IterationStats, LoopConfig, LoopState};
use crate::error::LoopError;

use super::layout::LoopPaths;

/// Atomically replace `state.json` with the given snapshot
pub fn write_state(paths: &LoopPaths, state: &LoopState) -> Result<(), LoopError> {
    debug!(status = %state.status, iteration = state.iteration, "write_state: called");
    let contents = serde_json::to_string_pretty(state)?;
    write_atomic(&paths.state_path(), &contents)
}

/// Read a persisted state snapshot
pub fn read_state(path: &Path) -> Result<LoopState, LoopError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write `config.json`; called once per run
pub fn write_config(paths: &LoopPaths, config: &LoopConfig) -> Result<(), LoopError> {
    debug!(name = %config.name, "write_config: called");
    let contents = serde_json::to_string_pretty(config)?;
    write_atomic(&paths.config_path(), &contents)
}

/// Read a persisted configuration
pub fn read_config(path: &Path) -> Result<LoopConfig, LoopError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write one immutable per-iteration artifact
///
/// Each artifact is written exactly once and never revised.
pub fn write_iteration(paths: &LoopPaths, stats: &IterationStats) -> Result<(), LoopError> {
    debug!(iteration = stats.iteration, "write_iteration: called");
    let contents = serde_json::to_string_pretty(stats)?;
    fs::write(paths.iteration_path(stats.iteration), contents)?;
    Ok(())
}

/// Write the full content to a sibling temp file, then rename over the
/// canonical path. POSIX rename is atomic within a filesystem.
fn write_atomic(path: &Path, contents: &str) -> Result<(), LoopError> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
