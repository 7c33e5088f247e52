//! Pattern execution.
//!
//! Wires the stages together for one request:
//! ```text
//! ExecutionRequest → ContentResolver → CommandBuilder → PipelineHandle
//!                                                     ↳ finalize::buffered | finalize::streamed
//! ```

use std::sync::Arc;
use std::time::Duration;

use patternd_core::config::ExecutionSettings;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::content::{ContentResolver, HttpFetcher};
use crate::error::ExecError;
use crate::relay::{
    DiagnosticSink, EventSink, RelayOutcome, StreamRelay, TracingDiagnostics, finalize,
};
use crate::request::{ExecuteBody, ExecutionRequest, SourceKind};
use crate::subprocess::{CommandBuilder, PipelineHandle};

/// Runs patterns through the generator. Shared by all requests.
pub struct Executor {
    resolver: ContentResolver,
    builder: CommandBuilder,
    transcript_pattern: String,
    deadline: Option<Duration>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl Executor {
    pub fn new(
        resolver: ContentResolver,
        builder: CommandBuilder,
        transcript_pattern: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            builder,
            transcript_pattern: transcript_pattern.into(),
            deadline: None,
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }

    /// Build an executor with an in-process HTTP fetcher.
    pub fn from_settings(settings: &ExecutionSettings) -> Result<Self, reqwest::Error> {
        let fetcher = HttpFetcher::new(settings.fetch_timeout(), settings.max_fetch_bytes)?;
        let resolver = ContentResolver::new(Arc::new(fetcher), settings.fetch_strategy);
        let builder = CommandBuilder::new(
            settings.generator_bin.clone(),
            settings.fetch_bin.clone(),
            settings.transcript_pattern.clone(),
        );
        Ok(Self::new(resolver, builder, settings.transcript_pattern.clone())
            .with_deadline(settings.execution_timeout()))
    }

    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Validate and classify a request body for `pattern`.
    pub fn request(
        &self,
        pattern: &str,
        body: ExecuteBody,
    ) -> Result<ExecutionRequest, ExecError> {
        ExecutionRequest::from_body(pattern, body, &self.transcript_pattern)
    }

    /// Whether `req` hands a pattern to the generator. A video request
    /// under the transcript pattern asks only for the transcript and names
    /// no pattern file.
    pub fn uses_pattern(&self, req: &ExecutionRequest) -> bool {
        !(req.source_kind == SourceKind::VideoReference && req.pattern == self.transcript_pattern)
    }

    /// Resolve content, build the command, and start the pipeline.
    ///
    /// Fetch failures return before any process exists.
    pub async fn prepare(&self, req: &ExecutionRequest) -> Result<PipelineHandle, ExecError> {
        let source = self.resolver.resolve(req).await?;
        let spec = self.builder.build(req, source);
        debug!(request_id = %req.request_id, ?spec, "Built command");
        PipelineHandle::start(spec, &req.request_id).await
    }

    /// Run `req` to completion and return the generator's combined output.
    pub async fn run_buffered(&self, req: &ExecutionRequest) -> Result<String, ExecError> {
        let handle = self.prepare(req).await?;
        finalize::buffered(handle, self.deadline).await
    }

    /// Relay a started pipeline into `sink` until it finishes or `cancel` fires.
    pub async fn run_streaming<S>(
        &self,
        handle: PipelineHandle,
        sink: S,
        cancel: CancellationToken,
    ) -> RelayOutcome
    where
        S: EventSink + Clone + 'static,
    {
        let relay = StreamRelay::new(handle.request_id(), Arc::clone(&self.diagnostics))
            .with_deadline(self.deadline);
        finalize::streamed(&relay, handle, sink, cancel).await
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::content::{FetchedPage, Fetcher};
    use async_trait::async_trait;
    use patternd_core::config::FetchStrategy;

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, ExecError> {
            Err(ExecError::FetchFailed {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            })
        }
    }

    fn executor(generator: &str) -> Executor {
        Executor::new(
            ContentResolver::new(Arc::new(FailingFetcher), FetchStrategy::InProcess),
            CommandBuilder::new(generator, "wget", "transcript"),
            "transcript",
        )
    }

    fn body(input: &str) -> ExecuteBody {
        ExecuteBody {
            input: input.to_string(),
            stream: false,
            youtube: false,
            model: None,
            context_length: None,
        }
    }

    #[tokio::test]
    async fn fetch_failure_precedes_process_start() {
        // A missing generator would fail with ProcessStartFailed if reached.
        let exec = executor("/nonexistent/generator");
        let req = exec.request("summarize", body("https://example.com")).unwrap();
        let err = exec.run_buffered(&req).await.unwrap_err();
        assert!(matches!(err, ExecError::FetchFailed { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn missing_generator_is_start_failure() {
        let exec = executor("/nonexistent/generator");
        let req = exec.request("summarize", body("hello")).unwrap();
        let err = exec.run_buffered(&req).await.unwrap_err();
        assert!(matches!(err, ExecError::ProcessStartFailed { .. }), "{err:?}");
    }

    #[test]
    fn transcript_only_requests_skip_the_pattern() {
        let exec = executor("/nonexistent/generator");
        let mut video = body("https://example.com/video");
        video.youtube = true;

        let transcript = exec.request("transcript", video.clone()).unwrap();
        assert!(!exec.uses_pattern(&transcript));

        let summarized = exec.request("summarize", video).unwrap();
        assert!(exec.uses_pattern(&summarized));

        let text = exec.request("transcript", body("just words")).unwrap();
        assert!(exec.uses_pattern(&text));
    }

    #[tokio::test]
    async fn invalid_pattern_name_is_malformed() {
        let exec = executor("/nonexistent/generator");
        let err = exec.request("../etc", body("hello")).unwrap_err();
        assert!(matches!(err, ExecError::RequestMalformed { .. }));
    }
}
