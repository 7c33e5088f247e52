//! Live relay of generator output.
//!
//! Three activities run per streaming execution:
//! ```text
//! stderr drain  → DiagnosticSink (never reaches the caller)
//! stdout drain  → EventSink, one line at a time, signals `done` once
//! exit waiter   → PipelineHandle::wait
//! ```
//! The relay finishes only after both the `done` signal and the process exit
//! have been observed, so output still buffered in the pipe when the process
//! exits is never truncated.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{DiagnosticSink, EventSink, RelayEvent, RelayOutcome};
use crate::error::ExecError;
use crate::subprocess::PipelineHandle;

/// How long trailing stderr may keep draining after the relay completes.
const STDERR_GRACE: Duration = Duration::from_secs(1);

/// Signalled exactly once by the stdout drain.
#[derive(Debug)]
enum StdoutOutcome {
    Drained,
    ReadError(String),
    SinkClosed,
}

enum Completion {
    Finished(Option<ExecError>),
    SinkClosed,
}

enum Interrupt {
    Cancelled,
    TimedOut,
}

/// Relays one pipeline's stdout to an [`EventSink`].
pub struct StreamRelay {
    request_id: String,
    diagnostics: Arc<dyn DiagnosticSink>,
    deadline: Option<Duration>,
}

impl StreamRelay {
    pub fn new(request_id: impl Into<String>, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            request_id: request_id.into(),
            diagnostics,
            deadline: None,
        }
    }

    /// Kill the pipeline and report [`ExecError::TimedOut`] after `deadline`.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Relay until the pipeline finishes, the deadline passes, `cancel`
    /// fires, or the sink closes.
    ///
    /// At most one [`RelayEvent::Error`] is emitted, always after every
    /// content line that was already delivered.
    pub async fn run<S>(
        &self,
        mut handle: PipelineHandle,
        sink: S,
        cancel: CancellationToken,
    ) -> RelayOutcome
    where
        S: EventSink + Clone + 'static,
    {
        let pipes = handle
            .take_stdout()
            .and_then(|out| handle.take_stderr().map(|err| (out, err)));
        match pipes {
            Ok((stdout, stderr)) => self.relay_pipes(handle, stdout, stderr, sink, cancel).await,
            Err(e) => {
                handle.kill().await;
                finish(sink, 0, Some(e)).await
            }
        }
    }

    /// Relay with the pipes already detached from `handle`.
    async fn relay_pipes<O, E, S>(
        &self,
        mut handle: PipelineHandle,
        stdout: O,
        stderr: E,
        sink: S,
        cancel: CancellationToken,
    ) -> RelayOutcome
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
        S: EventSink + Clone + 'static,
    {
        let request_id = self.request_id.clone();
        let mut stderr_task = tokio::spawn(drain_stderr(
            stderr,
            request_id.clone(),
            Arc::clone(&self.diagnostics),
        ));
        let delivered = Arc::new(AtomicU64::new(0));
        let (done_tx, done_rx) = oneshot::channel();
        let stdout_task = tokio::spawn(drain_stdout(
            stdout,
            sink.clone(),
            Arc::clone(&delivered),
            done_tx,
        ));

        let limit = self.deadline;
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending().await,
            }
        };

        let observed = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Interrupt::Cancelled),
            () = deadline => Err(Interrupt::TimedOut),
            completion = observe_completion(&mut handle, done_rx) => Ok(completion),
        };

        let outcome = match observed {
            Ok(Completion::Finished(error)) => {
                if tokio::time::timeout(STDERR_GRACE, &mut stderr_task)
                    .await
                    .is_err()
                {
                    debug!(request_id, "stderr still open after exit, abandoning");
                }
                finish(sink, delivered.load(Ordering::Acquire), error).await
            }
            Ok(Completion::SinkClosed) => {
                info!(request_id, "Consumer went away, killing pipeline");
                handle.kill().await;
                RelayOutcome {
                    lines: delivered.load(Ordering::Acquire),
                    error: Some(ExecError::Cancelled),
                }
            }
            Err(Interrupt::Cancelled) => {
                info!(request_id, "Relay cancelled, killing pipeline");
                stdout_task.abort();
                let _ = stdout_task.await;
                handle.kill().await;
                RelayOutcome {
                    lines: delivered.load(Ordering::Acquire),
                    error: Some(ExecError::Cancelled),
                }
            }
            Err(Interrupt::TimedOut) => {
                let err = limit.map_or(ExecError::TimedOut { secs: 0 }, ExecError::timed_out);
                warn!(request_id, error = %err, "Execution deadline passed, killing pipeline");
                // No content may follow the terminal error.
                stdout_task.abort();
                let _ = stdout_task.await;
                handle.kill().await;
                finish(sink, delivered.load(Ordering::Acquire), Some(err)).await
            }
        };
        stderr_task.abort();
        outcome
    }
}

/// Wait for both the process exit and the stdout `done` signal, keeping the
/// first error observed.
async fn observe_completion(
    handle: &mut PipelineHandle,
    mut done: oneshot::Receiver<StdoutOutcome>,
) -> Completion {
    let wait = handle.wait();
    tokio::pin!(wait);

    let mut exited = false;
    let mut drained = false;
    let mut first_error: Option<ExecError> = None;

    while !(exited && drained) {
        tokio::select! {
            result = &mut wait, if !exited => {
                exited = true;
                if let Err(e) = result {
                    record_first(&mut first_error, e);
                }
            }
            outcome = &mut done, if !drained => {
                drained = true;
                match outcome {
                    Ok(StdoutOutcome::Drained) => {}
                    Ok(StdoutOutcome::SinkClosed) => return Completion::SinkClosed,
                    Ok(StdoutOutcome::ReadError(reason)) => {
                        record_first(&mut first_error, ExecError::StreamReadError { reason });
                    }
                    Err(_) => record_first(
                        &mut first_error,
                        ExecError::StreamReadError {
                            reason: "stdout reader stopped unexpectedly".to_string(),
                        },
                    ),
                }
            }
        }
    }
    Completion::Finished(first_error)
}

fn record_first(slot: &mut Option<ExecError>, err: ExecError) {
    match slot {
        Some(first) => debug!(kept = %first, dropped = %err, "Discarding later failure"),
        None => *slot = Some(err),
    }
}

async fn finish<S: EventSink>(mut sink: S, lines: u64, error: Option<ExecError>) -> RelayOutcome {
    if let Some(e) = &error {
        if sink.emit(RelayEvent::error(e)).await.is_err() {
            debug!("Sink closed before terminal error could be delivered");
        }
    }
    RelayOutcome { lines, error }
}

/// Strip the line terminator and decode lossily.
fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\n").unwrap_or(buf);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

async fn drain_stdout<R, S>(
    stdout: R,
    mut sink: S,
    delivered: Arc<AtomicU64>,
    done: oneshot::Sender<StdoutOutcome>,
) where
    R: AsyncRead + Unpin,
    S: EventSink,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut sequence = 0u64;

    let outcome = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break StdoutOutcome::Drained,
            Ok(_) => {
                sequence += 1;
                let event = RelayEvent::content(sequence, decode_line(&buf));
                if sink.emit(event).await.is_err() {
                    break StdoutOutcome::SinkClosed;
                }
                delivered.store(sequence, Ordering::Release);
            }
            Err(e) => break StdoutOutcome::ReadError(e.to_string()),
        }
    };
    debug!(lines = sequence, ?outcome, "stdout reader finished");
    let _ = done.send(outcome);
}

async fn drain_stderr<R>(stderr: R, request_id: String, diagnostics: Arc<dyn DiagnosticSink>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => diagnostics.line(&request_id, &decode_line(&buf)),
            Err(e) => {
                debug!(request_id, error = %e, "stderr read failed");
                break;
            }
        }
    }
    debug!(request_id, "stderr reader finished");
}

#[cfg(all(test, unix))]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
#[path = "stream_tests.rs"]
mod tests;
