//! Event stream reader
//!
//! A dedicated task that owns the worker's stdout. Every raw line is
//! appended verbatim to the durable event log before any parsing, so the
//! log is a faithful transcript even when lines fail to parse. Parsed
//! events are forwarded over an unbounded channel in stdout order; EOF
//! closes the channel.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::worker::WorkerEvent;

/// Spawn the reader task over a worker output stream
///
/// Returns the parsed-event receiver and the task handle. Malformed lines
/// are dropped silently (worker output may contain non-event noise). If
/// the receiver is dropped, the task keeps appending raw lines to the log
/// until EOF so the transcript stays complete.
pub fn spawn_reader<R>(
    output: R,
    log: std::fs::File,
) -> (mpsc::UnboundedReceiver<WorkerEvent>, JoinHandle<()>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        debug!("reader: started");
        let mut log = std::io::BufWriter::new(log);
        let mut lines = BufReader::new(output).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Err(e) = writeln!(log, "{}", line) {
                        warn!(error = %e, "reader: failed to append to event log");
                    }
                    let _ = log.flush();

                    match WorkerEvent::parse(&line) {
                        Some(event) => {
                            debug!(kind = event.kind(), "reader: event");
                            if tx.send(event).is_err() {
                                debug!("reader: receiver gone, logging only");
                            }
                        }
                        None => {
                            debug!(len = line.len(), "reader: dropping unparseable line");
                        }
                    }
                }
                Ok(None) => {
                    debug!("reader: stream ended");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "reader: read failed, stopping");
                    break;
                }
            }
        }

        let _ = log.flush();
    });

    (rx, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    fn log_file(dir: &std::path::Path) -> (std::fs::File, std::path::PathBuf) {
        let path = dir.join("events.jsonl");
        let file = std::fs::File::create(&path).unwrap();
        (file, path)
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let temp = tempdir().unwrap();
        let (log, _path) = log_file(temp.path());

        let input = concat!(
            "{\"type\":\"turn_completed\"}\n",
            "{\"type\":\"tool_call\",\"name\":\"bash\"}\n",
            "{\"type\":\"agent_end\"}\n",
        );
        let (mut rx, task) = spawn_reader(Cursor::new(input.as_bytes().to_vec()), log);

        assert_eq!(
            rx.recv().await,
            Some(WorkerEvent::TurnCompleted { usage: None })
        );
        assert!(matches!(rx.recv().await, Some(WorkerEvent::Other(_))));
        assert_eq!(rx.recv().await, Some(WorkerEvent::AgentEnd));
        assert_eq!(rx.recv().await, None);

        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_raw_lines_logged_verbatim_including_noise() {
        let temp = tempdir().unwrap();
        let (log, path) = log_file(temp.path());

        let input = "warming up...\n{\"type\":\"agent_end\"}\nbye\n";
        let (mut rx, task) = spawn_reader(Cursor::new(input.as_bytes().to_vec()), log);

        // Only the parseable line comes through the channel
        assert_eq!(rx.recv().await, Some(WorkerEvent::AgentEnd));
        assert_eq!(rx.recv().await, None);
        task.await.unwrap();

        let logged = std::fs::read_to_string(&path).unwrap();
        assert_eq!(logged, input);
    }

    #[tokio::test]
    async fn test_logging_continues_after_receiver_dropped() {
        let temp = tempdir().unwrap();
        let (log, path) = log_file(temp.path());

        let input = "{\"type\":\"agent_end\"}\n{\"type\":\"agent_end\"}\n";
        let (rx, task) = spawn_reader(Cursor::new(input.as_bytes().to_vec()), log);
        drop(rx);

        task.await.unwrap();
        let logged = std::fs::read_to_string(&path).unwrap();
        assert_eq!(logged.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_eof_closes_channel() {
        let temp = tempdir().unwrap();
        let (log, _path) = log_file(temp.path());

        let (mut rx, task) = spawn_reader(Cursor::new(Vec::new()), log);
        assert_eq!(rx.recv().await, None);
        task.await.unwrap();
    }
}
