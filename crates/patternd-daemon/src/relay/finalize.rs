//! Completion of an execution in either delivery mode.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::stream::StreamRelay;
use super::types::{EventSink, RelayOutcome};
use crate::error::ExecError;
use crate::subprocess::PipelineHandle;

/// Run the pipeline to completion and return its merged stdout and stderr.
///
/// Past `deadline` the pipeline is killed and [`ExecError::TimedOut`] returned.
pub async fn buffered(
    mut handle: PipelineHandle,
    deadline: Option<Duration>,
) -> Result<String, ExecError> {
    let Some(limit) = deadline else {
        return handle.combined_output().await;
    };
    let finished = tokio::time::timeout(limit, handle.combined_output()).await;
    match finished {
        Ok(result) => result,
        Err(_) => {
            let err = ExecError::timed_out(limit);
            warn!(
                request_id = handle.request_id(),
                error = %err,
                "Execution deadline passed, killing pipeline"
            );
            handle.kill().await;
            Err(err)
        }
    }
}

/// Relay the pipeline into `sink`. The sink and every clone of it are
/// dropped by the time this returns, which closes the caller's stream.
pub async fn streamed<S>(
    relay: &StreamRelay,
    handle: PipelineHandle,
    sink: S,
    cancel: CancellationToken,
) -> RelayOutcome
where
    S: EventSink + Clone + 'static,
{
    let request_id = handle.request_id().to_string();
    let outcome = relay.run(handle, sink, cancel).await;
    match &outcome.error {
        None => info!(request_id, lines = outcome.lines, "Stream finished"),
        Some(ExecError::Cancelled) => {
            info!(request_id, lines = outcome.lines, "Stream abandoned by caller");
        }
        Some(e) => warn!(request_id, lines = outcome.lines, error = %e, "Stream ended with error"),
    }
    outcome
}

#[cfg(all(test, unix))]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::subprocess::{CommandSpec, StdinSource};
    use std::path::PathBuf;
    use std::time::Instant;

    async fn start(script: &str, stdin: StdinSource) -> PipelineHandle {
        let spec = CommandSpec {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            stdin,
        };
        PipelineHandle::start(spec, "test").await.unwrap()
    }

    #[tokio::test]
    async fn buffered_returns_full_output() {
        let handle = start(
            "cat; echo; echo note >&2",
            StdinSource::Literal("hello".to_string()),
        )
        .await;
        let output = buffered(handle, Some(Duration::from_secs(10))).await.unwrap();
        assert!(output.contains("hello\n"));
        assert!(output.contains("note\n"));
    }

    #[tokio::test]
    async fn buffered_deadline_kills_and_times_out() {
        let handle = start("sleep 30", StdinSource::Empty).await;
        let started = Instant::now();
        let err = buffered(handle, Some(Duration::from_millis(200)))
            .await
            .unwrap_err();
        assert_eq!(err, ExecError::TimedOut { secs: 1 });
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn buffered_without_deadline_reports_failure() {
        let handle = start("echo why >&2; exit 2", StdinSource::Empty).await;
        match buffered(handle, None).await.unwrap_err() {
            ExecError::ProcessExitNonZero { output, .. } => {
                assert_eq!(output.as_deref(), Some("why\n"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
