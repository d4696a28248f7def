//! Loop error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can end a loop run
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("Failed to spawn worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker exited unexpectedly ({status})")]
    WorkerExited { status: String },

    #[error("Failed to read task file {path}: {source}")]
    TaskRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid loop name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_message() {
        let err = LoopError::Spawn {
            command: "agent".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };

        let msg = err.to_string();
        assert!(msg.contains("agent"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_worker_exited_message() {
        let err = LoopError::WorkerExited {
            status: "exit code 3".to_string(),
        };

        assert!(err.to_string().contains("exit code 3"));
    }

    #[test]
    fn test_invalid_name_message() {
        let err = LoopError::InvalidName {
            name: "bad/name".to_string(),
            reason: "contains '/'".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("bad/name"));
        assert!(msg.contains("'/'"));
    }
}
