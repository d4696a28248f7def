//! LoopEngine - runs the iteration state machine over a worker process
//!
//! One engine drives one loop: spawn the worker, then for each iteration
//! send a prompt, wait for the worker's turn-finished signal, finalize
//! telemetry, persist state, and reset the worker's context before the
//! next iteration. The engine task is the only writer of loop state; a
//! background reader task feeds it parsed worker events over a channel,
//! so the per-iteration completion wait is a select over that channel and
//! the worker's one-shot exit notification.
//!
//! There is no per-iteration timeout: a worker that never signals
//! completion stalls the loop until an operator stop or kill.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use eyre::Context;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::domain::{CumulativeStats, LoopConfig, LoopState, LoopStatus};
use crate::error::LoopError;
use crate::events::spawn_reader;
use crate::state::{self, LoopPaths};
use crate::worker::{WorkerCommand, WorkerEvent, WorkerExit, WorkerHandle};

use super::observer::LoopObserver;
use super::telemetry::TelemetryAccumulator;

/// Shared control state between the engine task and its handles
#[derive(Debug, Default)]
struct Control {
    /// Set by stop() and kill(); observed at iteration boundaries
    stop_requested: AtomicBool,

    /// At most one queued follow-up; consumed at the next prompt selection
    pending_followup: Mutex<Option<String>>,

    /// Command sender into the worker's stdin writer, while running
    commands: Mutex<Option<mpsc::UnboundedSender<WorkerCommand>>>,

    /// Terminate signal into the worker's owner task, while running
    killer: Mutex<Option<mpsc::Sender<()>>>,
}

impl Control {
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn send_command(&self, cmd: WorkerCommand) {
        if let Ok(guard) = self.commands.lock()
            && let Some(tx) = guard.as_ref()
        {
            let _ = tx.send(cmd);
        }
    }

    fn clear_worker(&self) {
        if let Ok(mut guard) = self.commands.lock() {
            *guard = None;
        }
        if let Ok(mut guard) = self.killer.lock() {
            *guard = None;
        }
    }
}

/// Cloneable control surface for a running loop
///
/// All methods are safe to call from any task at any time; outside their
/// valid states they are no-ops.
#[derive(Clone)]
pub struct LoopHandle {
    control: Arc<Control>,
    state_rx: watch::Receiver<LoopState>,
}

impl LoopHandle {
    /// Send an out-of-band message to the worker mid-iteration
    ///
    /// The message is wrapped with an instruction to address it and then
    /// resume the original task, and sent immediately as a steer command.
    /// Best-effort: an idle or dead worker may ignore it.
    pub fn nudge(&self, message: &str) {
        debug!("LoopHandle::nudge: called");
        let text = format!(
            "Operator message: {}\n\nAddress this message, then resume the original task.",
            message
        );
        self.control.send_command(WorkerCommand::Steer { text });
    }

    /// Queue a message to become the next iteration's prompt
    ///
    /// Overwrites any previously queued follow-up. Takes effect at the
    /// next iteration's prompt selection, not the current one.
    pub fn queue_followup(&self, message: impl Into<String>) {
        debug!("LoopHandle::queue_followup: called");
        if let Ok(mut pending) = self.control.pending_followup.lock() {
            *pending = Some(message.into());
        }
    }

    /// Request a graceful stop at the next iteration boundary; idempotent
    pub fn stop(&self) {
        debug!("LoopHandle::stop: called");
        self.control.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Terminate the worker immediately; idempotent
    ///
    /// Sets the stop flag first so the resulting worker exit is treated
    /// as intentional, then signals termination.
    pub fn kill(&self) {
        debug!("LoopHandle::kill: called");
        self.control.stop_requested.store(true, Ordering::SeqCst);
        if let Ok(guard) = self.control.killer.lock()
            && let Some(kill) = guard.as_ref()
        {
            let _ = kill.try_send(());
        }
    }

    /// Latest persisted state snapshot
    pub fn state(&self) -> LoopState {
        self.state_rx.borrow().clone()
    }

    /// Latest status
    pub fn status(&self) -> LoopStatus {
        self.state_rx.borrow().status
    }
}

/// Loop execution engine
pub struct LoopEngine {
    config: LoopConfig,
    paths: LoopPaths,
    observer: Arc<dyn LoopObserver>,
    control: Arc<Control>,
    state_tx: watch::Sender<LoopState>,
    telemetry: TelemetryAccumulator,
    status: LoopStatus,
    iteration: u32,
    cumulative: CumulativeStats,
    started_at: DateTime<Utc>,
    error: Option<String>,
    worker_pid: Option<u32>,
}

impl std::fmt::Debug for LoopEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopEngine")
            .field("config", &self.config)
            .field("paths", &self.paths)
            .field("observer", &"<dyn LoopObserver>")
            .field("control", &self.control)
            .field("state_tx", &self.state_tx)
            .field("telemetry", &self.telemetry)
            .field("status", &self.status)
            .field("iteration", &self.iteration)
            .field("cumulative", &self.cumulative)
            .field("started_at", &self.started_at)
            .field("error", &self.error)
            .field("worker_pid", &self.worker_pid)
            .finish()
    }
}

impl LoopEngine {
    /// Create an engine for one run
    pub fn new(
        config: LoopConfig,
        loops_root: impl AsRef<Path>,
        observer: Arc<dyn LoopObserver>,
    ) -> Result<Self, LoopError> {
        debug!(name = %config.name, "LoopEngine::new: called");
        config.validate_name()?;

        let paths = LoopPaths::new(loops_root, &config.name);
        let (state_tx, _) = watch::channel(LoopState::initial(config.clone()));

        Ok(Self {
            config,
            paths,
            observer,
            control: Arc::new(Control::default()),
            state_tx,
            telemetry: TelemetryAccumulator::new(),
            status: LoopStatus::Starting,
            iteration: 0,
            cumulative: CumulativeStats::default(),
            started_at: Utc::now(),
            error: None,
            worker_pid: None,
        })
    }

    /// Control surface for this engine; cloneable, callable concurrently
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            control: Arc::clone(&self.control),
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// The loop's on-disk paths
    pub fn paths(&self) -> &LoopPaths {
        &self.paths
    }

    /// Run the loop to a terminal state
    ///
    /// Fatal conditions after setup are captured into the persisted error
    /// field and reported through the observer rather than returned; the
    /// cleanup path (terminate worker, flush event log, final persist)
    /// executes however the loop ends. Only pre-run environment failures
    /// (directory layout, event log, config write) surface as `Err`.
    pub async fn start(&mut self) -> eyre::Result<LoopStatus> {
        info!(
            name = %self.config.name,
            max_iterations = self.config.max_iterations,
            "Starting loop"
        );
        self.started_at = Utc::now();

        self.paths
            .prepare()
            .context("Failed to prepare loop directory")?;
        let log = self
            .paths
            .open_event_log()
            .context("Failed to open event log")?;
        state::write_config(&self.paths, &self.config).context("Failed to persist config")?;
        self.set_status(LoopStatus::Starting);

        // Spawn the worker; failure here is the fatal spawn path.
        let mut worker = match WorkerHandle::spawn(
            &self.config.worker_command,
            &self.config.worker_argv(),
            &self.config.working_dir,
        ) {
            Ok(worker) => worker,
            Err(e) => {
                warn!(error = %e, "Worker spawn failed");
                self.fail(e.to_string());
                return Ok(self.status);
            }
        };
        self.worker_pid = worker.pid();

        let stdout = worker.take_stdout();
        let exit_rx = worker.take_exit();
        let (Some(stdout), Some(mut exit_rx)) = (stdout, exit_rx) else {
            self.fail("Worker spawned without stdio pipes".to_string());
            worker.shutdown().await;
            return Ok(self.status);
        };

        // Wire the event stream reader to the worker's output.
        let (mut events, reader_task) = spawn_reader(stdout, log);

        // Expose the worker to the control surface.
        if let Ok(mut guard) = self.control.commands.lock() {
            *guard = Some(worker.command_sender());
        }
        if let Ok(mut guard) = self.control.killer.lock() {
            *guard = Some(worker.kill_sender());
        }

        self.set_status(LoopStatus::Running);

        let outcome = self.run_iterations(&mut events, &mut exit_rx).await;

        match outcome {
            Ok(()) => {
                let status = if self.control.stop_requested() {
                    LoopStatus::Stopped
                } else {
                    LoopStatus::Completed
                };
                info!(name = %self.config.name, iterations = self.iteration, %status, "Loop finished");
                self.set_status(status);
            }
            Err(e) => {
                warn!(name = %self.config.name, error = %e, "Loop failed");
                self.fail(e.to_string());
            }
        }

        // Cleanup runs on every exit path: detach the control surface,
        // terminate the worker if still alive, and let the reader drain
        // stdout so the event log is complete.
        self.control.clear_worker();
        self.worker_pid = None;
        worker.shutdown().await;
        drop(events);
        if let Err(e) = reader_task.await {
            debug!(error = %e, "Reader task join failed");
        }
        self.persist_state();

        Ok(self.status)
    }

    /// The iteration loop of the state machine
    async fn run_iterations(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
        exit_rx: &mut oneshot::Receiver<WorkerExit>,
    ) -> Result<(), LoopError> {
        while !self.control.stop_requested() && self.budget_remaining() {
            self.iteration += 1;
            info!(name = %self.config.name, iteration = self.iteration, "Iteration starting");

            self.telemetry.begin(self.iteration);
            self.observer.on_iteration_start(self.iteration);

            let prompt = self.next_prompt()?;
            self.control.send_command(WorkerCommand::Prompt { text: prompt });

            match self.await_turn(events, exit_rx).await {
                Ok(()) => {
                    if let Some(stats) = self.telemetry.finalize() {
                        state::write_iteration(&self.paths, &stats)?;
                        self.cumulative.absorb(&stats);
                        self.observer.on_iteration_end(&stats);
                    }
                    self.persist_state();
                }
                Err(e) => {
                    if self.control.stop_requested() {
                        // The exit was caused by our own stop/kill.
                        debug!(name = %self.config.name, "Worker exit during stop, treating as intentional");
                        return Ok(());
                    }
                    return Err(e);
                }
            }

            if self.control.stop_requested() {
                debug!(name = %self.config.name, "Stop requested, leaving loop");
                break;
            }
            if !self.budget_remaining() {
                debug!(name = %self.config.name, "Iteration budget exhausted");
                break;
            }

            // Next iteration starts with no memory of prior turns.
            self.control.send_command(WorkerCommand::Reset);
        }

        Ok(())
    }

    /// Whether the configured iteration budget allows another iteration
    fn budget_remaining(&self) -> bool {
        self.config.max_iterations == 0 || self.iteration < self.config.max_iterations
    }

    /// Suspend until the worker signals the turn finished, or fails
    ///
    /// Biased toward the event channel so events already emitted before
    /// an exit are dispatched first; the first `agent_end` wins. Events
    /// are forwarded to telemetry and then to the observer, in stream
    /// order.
    async fn await_turn(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<WorkerEvent>,
        exit_rx: &mut oneshot::Receiver<WorkerExit>,
    ) -> Result<(), LoopError> {
        loop {
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => {
                        self.telemetry.observe(&event);
                        self.observer.on_event(&event);
                        if matches!(event, WorkerEvent::AgentEnd) {
                            debug!(iteration = self.iteration, "await_turn: turn finished");
                            return Ok(());
                        }
                    }
                    None => {
                        // stdout closed; the exit status says how it died
                        let exit = (&mut *exit_rx).await.unwrap_or(WorkerExit {
                            code: None,
                            killed: false,
                        });
                        return Err(LoopError::WorkerExited {
                            status: exit.describe(),
                        });
                    }
                },

                exit = &mut *exit_rx => {
                    let exit = exit.unwrap_or(WorkerExit { code: None, killed: false });
                    return Err(LoopError::WorkerExited {
                        status: exit.describe(),
                    });
                }
            }
        }
    }

    /// Select this iteration's prompt
    ///
    /// Queued follow-up wins; otherwise a reflection instruction on every
    /// `reflect_every`-th iteration; otherwise the task file, re-read
    /// from disk every iteration so worker edits between iterations take
    /// effect.
    fn next_prompt(&mut self) -> Result<String, LoopError> {
        if let Ok(mut pending) = self.control.pending_followup.lock()
            && let Some(text) = pending.take()
        {
            debug!(iteration = self.iteration, "next_prompt: using queued follow-up");
            return Ok(text);
        }

        if self.config.reflect_every > 0 && self.iteration % self.config.reflect_every == 0 {
            debug!(iteration = self.iteration, "next_prompt: reflection iteration");
            return Ok(self.reflection_prompt());
        }

        let path = self.config.task_path();
        std::fs::read_to_string(&path).map_err(|source| LoopError::TaskRead { path, source })
    }

    fn reflection_prompt(&self) -> String {
        format!(
            "Pause implementation work for this iteration. Re-read {task}, \
             compare it against the current state of the repository, and \
             rewrite {task} so it accurately describes what remains to be \
             done. Make no other changes this iteration.",
            task = self.config.task_file
        )
    }

    /// Transition to `error` with a message
    fn fail(&mut self, message: String) {
        self.error = Some(message);
        self.set_status(LoopStatus::Error);
    }

    /// Transition status, persist, and notify the observer
    fn set_status(&mut self, status: LoopStatus) {
        debug!(name = %self.config.name, %status, "set_status: called");
        self.status = status;
        self.persist_state();
        self.observer.on_status(status, self.error.as_deref());
    }

    /// Produce a snapshot of the engine's live fields
    fn snapshot(&self) -> LoopState {
        LoopState {
            status: self.status,
            config: self.config.clone(),
            iteration: self.iteration,
            cumulative: self.cumulative.clone(),
            started_at: self.started_at,
            updated_at: Utc::now(),
            error: self.error.clone(),
            worker_pid: self.worker_pid,
        }
    }

    /// Persist the current snapshot and publish it to handles
    ///
    /// Persistence failures are logged, not fatal: the loop itself is the
    /// source of truth and the state file is advisory for pollers.
    fn persist_state(&mut self) {
        let snapshot = self.snapshot();
        if let Err(e) = state::write_state(&self.paths, &snapshot) {
            warn!(name = %self.config.name, error = %e, "Failed to persist state");
        }
        self.state_tx.send_replace(snapshot);
    }
}
