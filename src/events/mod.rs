//! Worker event stream consumption
//!
//! One reader task per run owns the worker's stdout: raw lines go to the
//! append-only event log, parsed events go to the engine in stream order.

mod reader;

pub use reader::spawn_reader;
