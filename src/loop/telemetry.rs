//! Per-iteration telemetry accumulation
//!
//! Counters for the in-flight iteration are reset by [`begin`] and
//! finalized exactly once by [`finalize`] when the iteration's completion
//! wait resolves. Turn events observed with no iteration in flight are
//! ignored (worker noise between iterations).
//!
//! [`begin`]: TelemetryAccumulator::begin
//! [`finalize`]: TelemetryAccumulator::finalize

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::IterationStats;
use crate::worker::WorkerEvent;

/// Accumulates stats for the iteration currently in flight
#[derive(Debug, Default)]
pub struct TelemetryAccumulator {
    current: Option<InFlight>,
}

#[derive(Debug)]
struct InFlight {
    iteration: u32,
    started_at: DateTime<Utc>,
    timer: Instant,
    turns: u32,
    input_tokens: u64,
    output_tokens: u64,
    cache_read_tokens: u64,
    cache_write_tokens: u64,
    cost_usd: f64,
}

impl TelemetryAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters for a new iteration and record its start time
    pub fn begin(&mut self, iteration: u32) {
        debug!(iteration, "TelemetryAccumulator::begin: called");
        self.current = Some(InFlight {
            iteration,
            started_at: Utc::now(),
            timer: Instant::now(),
            turns: 0,
            input_tokens: 0,
            output_tokens: 0,
            cache_read_tokens: 0,
            cache_write_tokens: 0,
            cost_usd: 0.0,
        });
    }

    /// Fold a worker event into the in-flight counters
    pub fn observe(&mut self, event: &WorkerEvent) {
        let WorkerEvent::TurnCompleted { usage } = event else {
            return;
        };
        let Some(current) = self.current.as_mut() else {
            debug!("observe: turn event with no iteration in flight, ignoring");
            return;
        };

        current.turns += 1;
        if let Some(usage) = usage {
            current.input_tokens += usage.input_tokens;
            current.output_tokens += usage.output_tokens;
            current.cache_read_tokens += usage.cache_read_tokens;
            current.cache_write_tokens += usage.cache_write_tokens;
            current.cost_usd += usage.cost_usd;
        }
        debug!(
            iteration = current.iteration,
            turns = current.turns,
            "observe: turn recorded"
        );
    }

    /// Finalize the in-flight iteration into an immutable record
    ///
    /// Returns `None` if no iteration was in flight (finalize called
    /// twice, or begin never called).
    pub fn finalize(&mut self) -> Option<IterationStats> {
        let current = self.current.take()?;
        let duration_ms = current.timer.elapsed().as_millis() as u64;
        debug!(iteration = current.iteration, duration_ms, "finalize: called");

        Some(IterationStats {
            iteration: current.iteration,
            duration_ms,
            turns: current.turns,
            input_tokens: current.input_tokens,
            output_tokens: current.output_tokens,
            cache_read_tokens: current.cache_read_tokens,
            cache_write_tokens: current.cache_write_tokens,
            cost_usd: current.cost_usd,
            started_at: current.started_at,
            ended_at: Utc::now(),
        })
    }
}
