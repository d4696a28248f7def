//! Durable state: loop directory layout and atomic persistence

mod layout;
pub mod persister;

pub use layout::{LoopEntry, LoopPaths, clean_loops, default_loops_root, list_loops};
pub use persister::{read_config, read_state, write_config, write_iteration, write_state};
