//! Loop configuration types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LoopError;

/// Maximum length of a loop name
pub const MAX_NAME_LEN: usize = 64;

/// Configuration for one loop run
///
/// Immutable for the lifetime of a run. Written once to `config.json`
/// when the loop starts and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Loop name; also the name of the loop's on-disk directory
    pub name: String,

    /// Directory the worker runs in
    pub working_dir: PathBuf,

    /// Task file path, relative to `working_dir`
    ///
    /// Re-read at the start of every iteration so the worker can rewrite
    /// it between iterations and have the edit take effect.
    #[serde(default = "default_task_file")]
    pub task_file: String,

    /// Maximum iterations (0 = unlimited)
    #[serde(default)]
    pub max_iterations: u32,

    /// Worker executable
    #[serde(default = "default_worker_command")]
    pub worker_command: String,

    /// Extra arguments passed to the worker
    #[serde(default)]
    pub worker_args: Vec<String>,

    /// Model override, passed to the worker as `--model`
    #[serde(default)]
    pub model: Option<String>,

    /// Provider override, passed to the worker as `--provider`
    #[serde(default)]
    pub provider: Option<String>,

    /// Thinking level override, passed to the worker as `--thinking`
    #[serde(default)]
    pub thinking_level: Option<String>,

    /// Replace every Nth iteration's prompt with a reflection instruction
    /// (0 = disabled)
    #[serde(default)]
    pub reflect_every: u32,
}

fn default_task_file() -> String {
    "TASK.md".to_string()
}

fn default_worker_command() -> String {
    "agent".to_string()
}

impl LoopConfig {
    /// Create a config with defaults for everything but name and working dir
    pub fn new(name: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        let name = name.into();
        debug!(%name, "LoopConfig::new: called");
        Self {
            name,
            working_dir: working_dir.into(),
            task_file: default_task_file(),
            max_iterations: 0,
            worker_command: default_worker_command(),
            worker_args: Vec::new(),
            model: None,
            provider: None,
            thinking_level: None,
            reflect_every: 0,
        }
    }

    /// Validate the loop name against the allowed character set
    ///
    /// Names become directory names, so only `[A-Za-z0-9._-]` is allowed.
    pub fn validate_name(&self) -> Result<(), LoopError> {
        debug!(name = %self.name, "LoopConfig::validate_name: called");
        validate_name(&self.name)
    }

    /// Absolute path of the task file
    pub fn task_path(&self) -> PathBuf {
        self.working_dir.join(&self.task_file)
    }

    /// Full worker argv: configured args plus override flags
    pub fn worker_argv(&self) -> Vec<String> {
        debug!(command = %self.worker_command, "LoopConfig::worker_argv: called");
        let mut argv = self.worker_args.clone();
        if let Some(model) = &self.model {
            argv.push("--model".to_string());
            argv.push(model.clone());
        }
        if let Some(provider) = &self.provider {
            argv.push("--provider".to_string());
            argv.push(provider.clone());
        }
        if let Some(thinking) = &self.thinking_level {
            argv.push("--thinking".to_string());
            argv.push(thinking.clone());
        }
        argv
    }
}

/// Validate a loop name: nonempty, bounded, `[A-Za-z0-9._-]` only
pub fn validate_name(name: &str) -> Result<(), LoopError> {
    if name.is_empty() {
        return Err(LoopError::InvalidName {
            name: name.to_string(),
            reason: "name is empty".to_string(),
        });
    }
    if name.len() > MAX_NAME_LEN {
        return Err(LoopError::InvalidName {
            name: name.to_string(),
            reason: format!("name exceeds {} characters", MAX_NAME_LEN),
        });
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(LoopError::InvalidName {
            name: name.to_string(),
            reason: format!("contains '{}'", bad),
        });
    }
    Ok(())
}

/// Check whether a directory entry name is a valid loop name
pub fn is_valid_name(name: &str) -> bool {
    validate_name(name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new_defaults() {
        let config = LoopConfig::new("fix-ci", "/tmp/repo");
        assert_eq!(config.name, "fix-ci");
        assert_eq!(config.working_dir, PathBuf::from("/tmp/repo"));
        assert_eq!(config.task_file, "TASK.md");
        assert_eq!(config.max_iterations, 0);
        assert_eq!(config.reflect_every, 0);
        assert!(config.model.is_none());
    }

    #[test]
    fn test_validate_name_accepts_allowed_charset() {
        for name in ["fix-ci", "loop_2", "a.b-c_d", "X9"] {
            assert!(validate_name(name).is_ok(), "expected '{}' to be valid", name);
        }
    }

    #[test]
    fn test_validate_name_rejects_bad_input() {
        assert!(validate_name("").is_err());
        assert!(validate_name("has space").is_err());
        assert!(validate_name("slash/y").is_err());
        assert!(validate_name(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn test_task_path_joins_working_dir() {
        let mut config = LoopConfig::new("n", "/work");
        config.task_file = "notes/TASK.md".to_string();
        assert_eq!(config.task_path(), PathBuf::from("/work/notes/TASK.md"));
    }

    #[test]
    fn test_worker_argv_appends_overrides() {
        let mut config = LoopConfig::new("n", "/work");
        config.worker_args = vec!["--autonomous".to_string()];
        config.model = Some("sonnet".to_string());
        config.thinking_level = Some("high".to_string());

        let argv = config.worker_argv();
        assert_eq!(
            argv,
            vec!["--autonomous", "--model", "sonnet", "--thinking", "high"]
        );
    }

    #[test]
    fn test_worker_argv_without_overrides() {
        let config = LoopConfig::new("n", "/work");
        assert!(config.worker_argv().is_empty());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let mut config = LoopConfig::new("roundtrip", "/tmp/w");
        config.max_iterations = 5;
        config.provider = Some("anthropic".to_string());
        config.reflect_every = 3;

        let json = serde_json::to_string(&config).unwrap();
        let parsed: LoopConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let json = r#"{"name":"n","working_dir":"/w"}"#;
        let config: LoopConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.task_file, "TASK.md");
        assert_eq!(config.worker_command, "agent");
        assert_eq!(config.max_iterations, 0);
    }
}
