//! Lifecycle observer trait
//!
//! The front-end supplies an observer; the engine calls it from its own
//! task. All methods default to no-ops so observers implement only what
//! they care about.

use crate::domain::{IterationStats, LoopStatus};
use crate::worker::WorkerEvent;

/// Callbacks invoked by the engine as the loop progresses
pub trait LoopObserver: Send + Sync {
    /// A parsed worker event, in stream order, after telemetry has seen it
    fn on_event(&self, _event: &WorkerEvent) {}

    /// An iteration is about to send its prompt
    fn on_iteration_start(&self, _iteration: u32) {}

    /// An iteration completed and its stats were finalized
    fn on_iteration_end(&self, _stats: &IterationStats) {}

    /// The loop changed status; `error` is set on the error transition
    fn on_status(&self, _status: LoopStatus, _error: Option<&str>) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl LoopObserver for NoopObserver {}
