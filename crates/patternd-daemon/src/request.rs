//! Execution request model and input classification.

use serde::Deserialize;

use crate::error::ExecError;

/// JSON body of `POST /patterns/{name}/execute`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteBody {
    pub input: String,
    #[serde(default)]
    pub stream: bool,
    /// Treat a URL input as a video to transcribe.
    #[serde(default)]
    pub youtube: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context_length: Option<i64>,
}

/// What the raw input refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Literal text fed to the generator.
    Plain,
    /// A video link the generator fetches and transcribes itself.
    VideoReference,
    /// A web page fetched before the generator starts.
    Url,
}

impl SourceKind {
    /// Classify `input`.
    ///
    /// An explicit video flag always wins. The transcript pattern implies a
    /// video only when the input actually is a URL.
    pub fn classify(input: &str, video_flag: bool, pattern: &str, transcript_pattern: &str) -> Self {
        if video_flag {
            return Self::VideoReference;
        }
        if !has_url_scheme(input) {
            return Self::Plain;
        }
        if pattern == transcript_pattern {
            Self::VideoReference
        } else {
            Self::Url
        }
    }
}

/// True when `input` starts with a lowercase `http://` or `https://`
/// scheme. Anything else, `HTTP://` included, is literal text.
pub fn has_url_scheme(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// A validated request to run one pattern.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub request_id: String,
    pub pattern: String,
    pub input: String,
    pub streaming: bool,
    pub source_kind: SourceKind,
    pub model: Option<String>,
    pub context_length: Option<i64>,
}

impl ExecutionRequest {
    /// Validate the pattern name and classify the body.
    pub fn from_body(
        pattern: &str,
        body: ExecuteBody,
        transcript_pattern: &str,
    ) -> Result<Self, ExecError> {
        patternd_core::patterns::validate_name(pattern)
            .map_err(|e| ExecError::malformed(e.to_string()))?;

        let source_kind =
            SourceKind::classify(&body.input, body.youtube, pattern, transcript_pattern);
        Ok(Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            pattern: pattern.to_string(),
            input: body.input,
            streaming: body.stream,
            source_kind,
            model: body.model.filter(|m| !m.trim().is_empty()),
            context_length: body.context_length,
        })
    }
}
