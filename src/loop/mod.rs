//! Loop execution module
//!
//! The Loop Engine owns the worker process for the lifetime of one run
//! and executes iterations: prompt → wait for turn-finished → record
//! stats → persist → reset context → repeat. Each iteration starts with
//! a fresh worker context; progress persists in files, not memory.

mod engine;
mod observer;
mod telemetry;

pub use engine::{LoopEngine, LoopHandle};
pub use observer::{LoopObserver, NoopObserver};
pub use telemetry::TelemetryAccumulator;
