//! Worker process handle
//!
//! Spawns and owns the single worker child process. Commands are written
//! to its stdin by a dedicated writer task (write failures are swallowed:
//! commands are best-effort signals, not guaranteed delivery). A child
//! owner task waits on the process and fires a one-shot exit notification
//! exactly once, recording whether the exit was caused by our own
//! terminate signal.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::LoopError;

use super::protocol::WorkerCommand;

/// How the worker process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, if the process exited normally
    pub code: Option<i32>,

    /// Whether the exit was triggered by [`WorkerHandle::terminate`]
    pub killed: bool,
}

impl WorkerExit {
    /// Human-readable exit description for error messages
    pub fn describe(&self) -> String {
        match (self.killed, self.code) {
            (true, _) => "terminated by request".to_string(),
            (false, Some(code)) => format!("exit code {}", code),
            (false, None) => "killed by signal".to_string(),
        }
    }
}

/// Handle to a spawned worker process
#[derive(Debug)]
pub struct WorkerHandle {
    pid: Option<u32>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
    kill_tx: mpsc::Sender<()>,
    exit_rx: Option<oneshot::Receiver<WorkerExit>>,
    stdout: Option<ChildStdout>,
    writer_task: JoinHandle<()>,
    owner_task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Spawn the worker with piped stdin/stdout
    ///
    /// stderr is inherited so worker diagnostics stay visible to the
    /// operator; only stdout carries the event protocol.
    pub fn spawn(command: &str, argv: &[String], working_dir: &Path) -> Result<Self, LoopError> {
        debug!(%command, ?argv, working_dir = %working_dir.display(), "WorkerHandle::spawn: called");

        let mut child = Command::new(command)
            .args(argv)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| LoopError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let pid = child.id();
        debug!(?pid, "WorkerHandle::spawn: worker started");

        let mut stdin = child.stdin.take();
        let stdout = child.stdout.take();

        // Writer task: serialize commands onto stdin, one JSON line each.
        // A broken pipe means the worker is gone; the command is dropped.
        let (commands, mut cmd_rx) = mpsc::unbounded_channel::<WorkerCommand>();
        let writer_task = tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                let Some(stdin) = stdin.as_mut() else { break };
                let line = match serde_json::to_string(&cmd) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "writer: failed to serialize command");
                        continue;
                    }
                };
                debug!(%line, "writer: sending command");
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    debug!(error = %e, "writer: stdin not writable, dropping command");
                    continue;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    debug!(error = %e, "writer: stdin not writable, dropping newline");
                    continue;
                }
                let _ = stdin.flush().await;
            }
            debug!("writer: command channel closed");
        });

        // Owner task: wait for exit (or a terminate request) and fire the
        // exit notification exactly once.
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        let owner_task = tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => WorkerExit { code: status.code(), killed: false },
                    Err(e) => {
                        warn!(error = %e, "owner: wait on worker failed");
                        WorkerExit { code: None, killed: false }
                    }
                },
                _ = kill_rx.recv() => {
                    debug!("owner: terminate requested, killing worker");
                    if let Err(e) = child.start_kill() {
                        debug!(error = %e, "owner: start_kill failed (already dead?)");
                    }
                    match child.wait().await {
                        Ok(status) => WorkerExit { code: status.code(), killed: true },
                        Err(_) => WorkerExit { code: None, killed: true },
                    }
                }
            };
            debug!(?exit, "owner: worker exited");
            let _ = exit_tx.send(exit);
        });

        Ok(Self {
            pid,
            commands,
            kill_tx,
            exit_rx: Some(exit_rx),
            stdout,
            writer_task,
            owner_task,
        })
    }

    /// Worker process id, if still known
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Send a command; silently dropped if the worker is gone
    pub fn send(&self, cmd: WorkerCommand) {
        if self.commands.send(cmd).is_err() {
            debug!("WorkerHandle::send: writer gone, command dropped");
        }
    }

    /// Clone of the command sender, for the control surface
    pub fn command_sender(&self) -> mpsc::UnboundedSender<WorkerCommand> {
        self.commands.clone()
    }

    /// Clone of the terminate-signal sender, for the control surface
    pub fn kill_sender(&self) -> mpsc::Sender<()> {
        self.kill_tx.clone()
    }

    /// Take the one-shot exit notification (available once)
    pub fn take_exit(&mut self) -> Option<oneshot::Receiver<WorkerExit>> {
        self.exit_rx.take()
    }

    /// Take the worker's stdout stream (available once)
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Request termination; idempotent and best-effort
    pub fn terminate(&self) {
        debug!("WorkerHandle::terminate: called");
        let _ = self.kill_tx.try_send(());
    }

    /// Terminate if still alive and reap the child
    pub async fn shutdown(self) {
        debug!("WorkerHandle::shutdown: called");
        let _ = self.kill_tx.try_send(());
        drop(self.commands);
        if tokio::time::timeout(Duration::from_secs(5), self.owner_task)
            .await
            .is_err()
        {
            warn!("shutdown: timed out waiting for worker to exit");
        }
        let _ = tokio::time::timeout(Duration::from_secs(1), self.writer_task).await;
    }
}
