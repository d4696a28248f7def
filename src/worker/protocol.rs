//! Worker wire protocol
//!
//! JSON-over-newline in both directions. Each line is an object with a
//! `type` discriminator. Commands go to the worker's stdin; events come
//! back on its stdout. Unknown event kinds pass through opaquely; lines
//! that are not JSON objects are dropped by the reader.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands sent to the worker's stdin
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Submit the iteration's prompt
    Prompt { text: String },

    /// Out-of-band instruction delivered after the current tool step
    Steer { text: String },

    /// Clear the worker's memory of prior turns without restarting it
    Reset,
}

/// Token/cost usage attached to a completed turn
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
    #[serde(default)]
    pub cost_usd: f64,
}

/// Events read from the worker's stdout
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// An assistant turn finished; usage data is optional
    TurnCompleted { usage: Option<TurnUsage> },

    /// The worker finished processing the current prompt
    AgentEnd,

    /// Any other well-formed event; forwarded to the observer untouched
    Other(Value),
}

impl WorkerEvent {
    /// Parse one stdout line
    ///
    /// Returns `None` for anything that is not a JSON object with a
    /// string `type` field; such lines are dropped by the caller. Worker
    /// output may legitimately contain non-event noise, so there is no
    /// error to surface.
    pub fn parse(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        let kind = value.get("type")?.as_str()?;

        match kind {
            "turn_completed" => {
                let usage = value
                    .get("usage")
                    .cloned()
                    .and_then(|u| serde_json::from_value::<TurnUsage>(u).ok());
                Some(Self::TurnCompleted { usage })
            }
            "agent_end" => Some(Self::AgentEnd),
            _ => Some(Self::Other(value)),
        }
    }

    /// Event kind name, for logging
    pub fn kind(&self) -> &str {
        match self {
            Self::TurnCompleted { .. } => "turn_completed",
            Self::AgentEnd => "agent_end",
            Self::Other(value) => value.get("type").and_then(Value::as_str).unwrap_or("unknown"),
        }
    }
}
