//! Worker process ownership and wire protocol
//!
//! The worker is a black box: a child process that accepts line-delimited
//! JSON commands on stdin and emits line-delimited JSON events on stdout.

mod process;
mod protocol;

pub use process::{WorkerExit, WorkerHandle};
pub use protocol::{TurnUsage, WorkerCommand, WorkerEvent};
