//! Tests for StreamRelay.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::sync::CancellationToken;

use super::StreamRelay;
use crate::error::ExecError;
use crate::relay::types::{DiagnosticSink, EventSink, RelayEvent, SinkClosed};
use crate::subprocess::{CommandSpec, PipelineHandle, PredecessorSpec, StdinSource};

#[derive(Clone, Default)]
struct CollectSink {
    events: Arc<Mutex<Vec<RelayEvent>>>,
}

impl CollectSink {
    fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for CollectSink {
    async fn emit(&mut self, event: RelayEvent) -> Result<(), SinkClosed> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Accepts `remaining` events, then reports the consumer gone.
#[derive(Clone)]
struct ClosingSink {
    remaining: Arc<Mutex<usize>>,
}

#[async_trait]
impl EventSink for ClosingSink {
    async fn emit(&mut self, _event: RelayEvent) -> Result<(), SinkClosed> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return Err(SinkClosed);
        }
        *remaining -= 1;
        Ok(())
    }
}

#[derive(Default)]
struct CaptureDiagnostics {
    lines: Mutex<Vec<String>>,
}

impl DiagnosticSink for CaptureDiagnostics {
    fn line(&self, _request_id: &str, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }
}

/// Yields one line, then fails every read.
#[derive(Default)]
struct BrokenStdout {
    served: bool,
}

impl AsyncRead for BrokenStdout {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.served {
            return Poll::Ready(Err(io::Error::other("device gone")));
        }
        self.served = true;
        buf.put_slice(b"one\n");
        Poll::Ready(Ok(()))
    }
}

fn sh(script: &str) -> CommandSpec {
    CommandSpec {
        program: PathBuf::from("sh"),
        args: vec!["-c".to_string(), script.to_string()],
        stdin: StdinSource::Empty,
    }
}

async fn start(spec: CommandSpec) -> PipelineHandle {
    PipelineHandle::start(spec, "test").await.unwrap()
}

fn relay() -> (StreamRelay, Arc<CaptureDiagnostics>) {
    let diagnostics = Arc::new(CaptureDiagnostics::default());
    (StreamRelay::new("test", diagnostics.clone()), diagnostics)
}

fn lines(events: &[RelayEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            RelayEvent::Content { line, .. } => Some(line.clone()),
            RelayEvent::Error { .. } => None,
        })
        .collect()
}

#[tokio::test]
async fn relays_lines_in_order_with_sequence_numbers() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let handle = start(sh("for i in 1 2 3 4 5; do echo line$i; done")).await;

    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_eq!(outcome.lines, 5);
    let events = sink.events();
    assert_eq!(
        events,
        (1..=5)
            .map(|i| RelayEvent::content(i, format!("line{i}")))
            .collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn output_written_after_exit_is_not_truncated() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    // The shell exits at once; a background child keeps writing.
    let handle = start(sh("(sleep 0.3; echo late) & echo early")).await;

    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_eq!(lines(&sink.events()), vec!["early", "late"]);
}

#[tokio::test]
async fn non_zero_exit_yields_one_error_after_content() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let handle = start(sh("echo a; echo b; exit 3")).await;

    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert!(matches!(
        outcome.error,
        Some(ExecError::ProcessExitNonZero { .. })
    ));
    let events = sink.events();
    assert_eq!(events.len(), 3);
    assert_eq!(lines(&events), vec!["a", "b"]);
    assert!(matches!(events[2], RelayEvent::Error { .. }));
}

#[tokio::test]
async fn read_error_and_exit_failure_yield_a_single_error() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let mut handle = start(sh("exit 3")).await;
    drop(handle.take_stdout().unwrap());
    let stderr = handle.take_stderr().unwrap();

    let outcome = relay
        .relay_pipes(
            handle,
            BrokenStdout::default(),
            stderr,
            sink.clone(),
            CancellationToken::new(),
        )
        .await;

    assert!(
        matches!(
            outcome.error,
            Some(ExecError::StreamReadError { .. } | ExecError::ProcessExitNonZero { .. })
        ),
        "{:?}",
        outcome.error
    );
    assert_eq!(outcome.lines, 1);
    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], RelayEvent::content(1, "one"));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, RelayEvent::Error { .. }))
            .count(),
        1
    );
    assert_eq!(events[1], RelayEvent::error(outcome.error.as_ref().unwrap()));
}

#[tokio::test]
async fn stderr_goes_to_diagnostics_only() {
    let (relay, diagnostics) = relay();
    let sink = CollectSink::default();
    let handle = start(sh("echo out; echo diag >&2")).await;

    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert!(outcome.is_success());
    assert_eq!(lines(&sink.events()), vec!["out"]);
    assert_eq!(*diagnostics.lines.lock().unwrap(), vec!["diag".to_string()]);
}

#[tokio::test]
async fn line_endings_and_invalid_utf8_are_normalized() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let handle = start(sh(r"printf 'a\r\nb\377\ntail'")).await;

    relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert_eq!(lines(&sink.events()), vec!["a", "b\u{FFFD}", "tail"]);
}

#[tokio::test]
async fn failing_predecessor_is_reported_after_content() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let spec = CommandSpec {
        program: PathBuf::from("cat"),
        args: vec![],
        stdin: StdinSource::Chained(PredecessorSpec {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), "echo fetched; exit 4".to_string()],
        }),
    };
    let handle = start(spec).await;

    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    match outcome.error {
        Some(ExecError::ProcessExitNonZero { program, .. }) => assert_eq!(program, "sh"),
        other => panic!("unexpected outcome: {other:?}"),
    }
    let events = sink.events();
    assert_eq!(lines(&events), vec!["fetched"]);
    assert!(matches!(events.last(), Some(RelayEvent::Error { .. })));
}

#[tokio::test]
async fn cancellation_kills_pipeline_without_error_event() {
    let (relay, _) = relay();
    let sink = CollectSink::default();
    let handle = start(sh("echo first; sleep 30")).await;
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let outcome = relay.run(handle, sink.clone(), cancel).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.error, Some(ExecError::Cancelled));
    assert!(
        sink.events()
            .iter()
            .all(|e| matches!(e, RelayEvent::Content { .. }))
    );
}

#[tokio::test]
async fn deadline_emits_timeout_error() {
    let (relay, _) = relay();
    let relay = relay.with_deadline(Some(Duration::from_millis(300)));
    let sink = CollectSink::default();
    let handle = start(sh("echo first; sleep 30")).await;

    let started = Instant::now();
    let outcome = relay.run(handle, sink.clone(), CancellationToken::new()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.error, Some(ExecError::TimedOut { secs: 1 }));
    let events = sink.events();
    assert_eq!(lines(&events), vec!["first"]);
    assert_eq!(
        events.last(),
        Some(&RelayEvent::error(&ExecError::TimedOut { secs: 1 }))
    );
}

#[tokio::test]
async fn closed_sink_stops_the_generator() {
    let (relay, _) = relay();
    let sink = ClosingSink {
        remaining: Arc::new(Mutex::new(1)),
    };
    let handle = start(sh("while true; do echo tick; sleep 0.05; done")).await;

    let started = Instant::now();
    let outcome = relay.run(handle, sink, CancellationToken::new()).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(outcome.lines, 1);
    assert_eq!(outcome.error, Some(ExecError::Cancelled));
}
