//! Iteration and cumulative statistics
//!
//! One immutable `IterationStats` record is written per completed
//! iteration; `CumulativeStats` is the running total across the run and
//! only ever grows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics for one completed iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    /// Iteration number (1-indexed)
    pub iteration: u32,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,

    /// Assistant turns completed during the iteration
    pub turns: u32,

    /// Input tokens consumed
    pub input_tokens: u64,

    /// Output tokens generated
    pub output_tokens: u64,

    /// Tokens served from prompt cache
    pub cache_read_tokens: u64,

    /// Tokens written to prompt cache
    pub cache_write_tokens: u64,

    /// Cost in USD
    pub cost_usd: f64,

    /// When the iteration started
    pub started_at: DateTime<Utc>,

    /// When the iteration ended
    pub ended_at: DateTime<Utc>,
}

/// Running totals across the whole run
///
/// Updated exactly once per completed iteration via [`absorb`], so every
/// counter is monotonically non-decreasing for the lifetime of a run.
///
/// [`absorb`]: CumulativeStats::absorb
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CumulativeStats {
    /// Completed iterations
    pub iterations: u32,

    /// Total wall-clock duration of completed iterations, milliseconds
    pub duration_ms: u64,

    /// Total assistant turns
    pub turns: u32,

    /// Total input tokens
    pub input_tokens: u64,

    /// Total output tokens
    pub output_tokens: u64,

    /// Total cost in USD
    pub cost_usd: f64,
}

impl CumulativeStats {
    /// Fold one completed iteration into the totals
    pub fn absorb(&mut self, stats: &IterationStats) {
        self.iterations += 1;
        self.duration_ms += stats.duration_ms;
        self.turns += stats.turns;
        self.input_tokens += stats.input_tokens;
        self.output_tokens += stats.output_tokens;
        self.cost_usd += stats.cost_usd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(iteration: u32) -> IterationStats {
        IterationStats {
            iteration,
            duration_ms: 1000,
            turns: 2,
            input_tokens: 100,
            output_tokens: 40,
            cache_read_tokens: 10,
            cache_write_tokens: 5,
            cost_usd: 0.25,
            started_at: Utc::now(),
            ended_at: Utc::now(),
        }
    }

    #[test]
    fn test_absorb_accumulates() {
        let mut cumulative = CumulativeStats::default();
        cumulative.absorb(&stats(1));
        cumulative.absorb(&stats(2));

        assert_eq!(cumulative.iterations, 2);
        assert_eq!(cumulative.duration_ms, 2000);
        assert_eq!(cumulative.turns, 4);
        assert_eq!(cumulative.input_tokens, 200);
        assert_eq!(cumulative.output_tokens, 80);
        assert!((cumulative.cost_usd - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_absorb_is_monotonic() {
        let mut cumulative = CumulativeStats::default();
        let mut prev = cumulative.clone();

        for i in 1..=5 {
            cumulative.absorb(&stats(i));
            assert!(cumulative.iterations > prev.iterations);
            assert!(cumulative.input_tokens >= prev.input_tokens);
            assert!(cumulative.cost_usd >= prev.cost_usd);
            prev = cumulative.clone();
        }
        assert_eq!(cumulative.iterations, 5);
    }

    #[test]
    fn test_iteration_stats_serde_roundtrip() {
        let original = stats(3);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: IterationStats = serde_json::from_str(&json).unwrap();
        assert_eq!(original, parsed);
    }
}
