//! Execution error taxonomy.

use std::time::Duration;

/// Errors raised while resolving, starting, or relaying a pattern execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecError {
    #[error("Malformed request: {reason}")]
    RequestMalformed { reason: String },

    #[error("Failed to fetch {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("Failed to start {program}: {reason}")]
    ProcessStartFailed { program: String, reason: String },

    #[error("Failed to set up {stream} pipe: {reason}")]
    ProcessPipeFailed { stream: &'static str, reason: String },

    #[error("Error reading process output: {reason}")]
    StreamReadError { reason: String },

    /// The child reported failure. `output` carries the captured combined
    /// output when the execution was buffered.
    #[error("{program} failed: {status}")]
    ProcessExitNonZero {
        program: String,
        status: String,
        output: Option<String>,
    },

    #[error("Execution timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("Execution cancelled")]
    Cancelled,
}

impl ExecError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::RequestMalformed {
            reason: reason.into(),
        }
    }

    /// Timeout for `limit`, rounded up to whole seconds.
    pub fn timed_out(limit: Duration) -> Self {
        let secs = limit.as_secs() + u64::from(limit.subsec_nanos() > 0);
        Self::TimedOut { secs }
    }

    /// True for failures detected before any child process was started.
    pub const fn is_pre_process(&self) -> bool {
        matches!(self, Self::RequestMalformed { .. } | Self::FetchFailed { .. })
    }
}
