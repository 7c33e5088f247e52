//! Relay module types.

use async_trait::async_trait;

use crate::error::ExecError;

/// One relayed item of generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A line of primary stdout. `sequence` starts at 1 and increases by one
    /// per line in the order the generator wrote them.
    Content { sequence: u64, line: String },
    /// The single terminal failure of the execution.
    Error { message: String },
}

impl RelayEvent {
    pub fn content(sequence: u64, line: impl Into<String>) -> Self {
        Self::Content {
            sequence,
            line: line.into(),
        }
    }

    pub fn error(err: &ExecError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

/// The consumer went away; nothing more can be delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Destination for relayed events.
///
/// `emit` must not return until the event has been accepted downstream;
/// the relay reads the next line only after it returns.
#[async_trait]
pub trait EventSink: Send {
    async fn emit(&mut self, event: RelayEvent) -> Result<(), SinkClosed>;
}

/// Receives generator stderr lines. Never surfaced to the caller.
pub trait DiagnosticSink: Send + Sync {
    fn line(&self, request_id: &str, line: &str);
}

/// Logs stderr lines through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn line(&self, request_id: &str, line: &str) {
        tracing::warn!(request_id, "stderr: {}", line);
    }
}

/// Final state of a streaming execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Content lines delivered to the sink.
    pub lines: u64,
    /// The one terminal error, if any. Emitted to the sink unless the sink
    /// itself had closed.
    pub error: Option<ExecError>,
}

impl RelayOutcome {
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
