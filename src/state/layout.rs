//! On-disk layout of loop directories
//!
//! Each loop lives under `<loops_root>/<name>/`:
//!
//! ```text
//! config.json       written once at start
//! state.json        latest LoopState, replaced atomically
//! events.jsonl      append-only raw worker output, truncated at start
//! iterations/       one immutable NNN.json per completed iteration
//! ```
//!
//! The task file is NOT here; it lives in the working directory so the
//! worker can rewrite it between iterations.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::domain::{LoopState, is_valid_name};

use super::persister;

/// Paths inside one loop's directory
#[derive(Debug, Clone)]
pub struct LoopPaths {
    root: PathBuf,
}

impl LoopPaths {
    /// Paths for the named loop under the given root
    pub fn new(loops_root: impl AsRef<Path>, name: &str) -> Self {
        Self {
            root: loops_root.as_ref().join(name),
        }
    }

    /// The loop's directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `config.json`
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// `state.json`
    pub fn state_path(&self) -> PathBuf {
        self.root.join("state.json")
    }

    /// `events.jsonl`
    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// `iterations/`
    pub fn iterations_dir(&self) -> PathBuf {
        self.root.join("iterations")
    }

    /// `iterations/NNN.json`, zero-padded to three digits
    pub fn iteration_path(&self, iteration: u32) -> PathBuf {
        self.iterations_dir().join(format!("{:03}.json", iteration))
    }

    /// Prepare the directory for a fresh run
    ///
    /// Creates the layout, truncates the event log, and deletes the state
    /// file and all per-iteration artifacts from any previous run in the
    /// same directory, so a restart never mixes generations.
    pub fn prepare(&self) -> io::Result<()> {
        debug!(root = %self.root.display(), "LoopPaths::prepare: called");
        fs::create_dir_all(self.iterations_dir())?;

        // Truncate the event log
        fs::File::create(self.events_path())?;

        let state_path = self.state_path();
        if state_path.exists() {
            fs::remove_file(&state_path)?;
        }

        for entry in fs::read_dir(self.iterations_dir())? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                debug!(path = %path.display(), "prepare: removing stale iteration artifact");
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }

    /// Open the event log for appending
    pub fn open_event_log(&self) -> io::Result<fs::File> {
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.events_path())
    }
}

/// Default loops root: `~/.workloop/loops`
pub fn default_loops_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".workloop")
        .join("loops")
}

/// One entry from scanning a loops root
#[derive(Debug)]
pub struct LoopEntry {
    /// Directory name (the loop name)
    pub name: String,
    /// Parsed state, if `state.json` exists and parses
    pub state: Option<LoopState>,
}

/// Enumerate loop directories under a root, sorted by name
///
/// Directories without a readable state file are listed with `state:
/// None` rather than skipped, so half-written or pre-run loops are still
/// visible.
pub fn list_loops(loops_root: impl AsRef<Path>) -> io::Result<Vec<LoopEntry>> {
    let loops_root = loops_root.as_ref();
    debug!(root = %loops_root.display(), "list_loops: called");

    if !loops_root.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(loops_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_valid_name(&name) {
            debug!(%name, "list_loops: skipping non-loop directory");
            continue;
        }

        let paths = LoopPaths::new(loops_root, &name);
        let state = match persister::read_state(&paths.state_path()) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(%name, error = %e, "list_loops: no readable state");
                None
            }
        };
        entries.push(LoopEntry { name, state });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Delete historical loop directories; returns the removed names
///
/// With `all = false`, only directories whose persisted status is
/// terminal are removed; running or unreadable loops are left alone.
/// With `all = true`, every loop directory goes.
pub fn clean_loops(loops_root: impl AsRef<Path>, all: bool) -> io::Result<Vec<String>> {
    let loops_root = loops_root.as_ref();
    debug!(root = %loops_root.display(), all, "clean_loops: called");

    let mut removed = Vec::new();
    for entry in list_loops(loops_root)? {
        let terminal = entry
            .state
            .as_ref()
            .is_some_and(|s| s.status.is_terminal());
        if !all && !terminal {
            debug!(name = %entry.name, "clean_loops: keeping non-terminal loop");
            continue;
        }

        let dir = loops_root.join(&entry.name);
        match fs::remove_dir_all(&dir) {
            Ok(()) => removed.push(entry.name),
            Err(e) => warn!(name = %entry.name, error = %e, "clean_loops: failed to remove"),
        }
    }

    Ok(removed)
}
