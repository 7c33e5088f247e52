//! Generator command construction.
//!
//! Every argument is derived from typed request fields, so there is no
//! failure mode at this stage.

use std::path::PathBuf;

use crate::content::ContentSource;
use crate::request::ExecutionRequest;

const PATTERN_FLAG: &str = "--pattern";
const STREAM_FLAG: &str = "--stream";
const VIDEO_FLAG: &str = "-y";
const TRANSCRIPT_FLAG: &str = "--transcript";

/// A process whose stdout feeds the primary's stdin. It never has a
/// predecessor of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredecessorSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// What the primary process reads on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource {
    /// Nothing; the arguments carry the source.
    Empty,
    /// Literal bytes written by the daemon.
    Literal(String),
    /// The stdout of a chained predecessor process.
    Chained(PredecessorSpec),
}

/// Fully built primary command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub stdin: StdinSource,
}

impl CommandSpec {
    pub const fn predecessor(&self) -> Option<&PredecessorSpec> {
        match &self.stdin {
            StdinSource::Chained(pre) => Some(pre),
            _ => None,
        }
    }
}

/// Builds generator argument vectors.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    generator_bin: PathBuf,
    fetch_bin: PathBuf,
    transcript_pattern: String,
}

impl CommandBuilder {
    pub fn new(
        generator_bin: impl Into<PathBuf>,
        fetch_bin: impl Into<PathBuf>,
        transcript_pattern: impl Into<String>,
    ) -> Self {
        Self {
            generator_bin: generator_bin.into(),
            fetch_bin: fetch_bin.into(),
            transcript_pattern: transcript_pattern.into(),
        }
    }

    pub fn build(&self, req: &ExecutionRequest, source: ContentSource) -> CommandSpec {
        let (args, stdin) = match source {
            ContentSource::DeferToProcessArgs { url } => {
                (self.video_args(req, url), StdinSource::Empty)
            }
            ContentSource::InlineText(text) | ContentSource::PreFetchedText(text) => {
                (pattern_args(req), StdinSource::Literal(text))
            }
            ContentSource::PipedFromFetcher { url } => (
                pattern_args(req),
                StdinSource::Chained(PredecessorSpec {
                    program: self.fetch_bin.clone(),
                    args: vec!["-qO-".to_string(), url],
                }),
            ),
        };
        CommandSpec {
            program: self.generator_bin.clone(),
            args,
            stdin,
        }
    }

    fn video_args(&self, req: &ExecutionRequest, url: String) -> Vec<String> {
        let mut args = vec![VIDEO_FLAG.to_string(), url, TRANSCRIPT_FLAG.to_string()];
        // The transcript pattern alone means "just the transcript".
        if req.pattern != self.transcript_pattern {
            args.push(PATTERN_FLAG.to_string());
            args.push(req.pattern.clone());
            if req.streaming {
                args.push(STREAM_FLAG.to_string());
            }
        }
        push_model_flags(&mut args, req);
        args
    }
}

fn pattern_args(req: &ExecutionRequest) -> Vec<String> {
    let mut args = vec![PATTERN_FLAG.to_string(), req.pattern.clone()];
    if req.streaming {
        args.push(STREAM_FLAG.to_string());
    }
    push_model_flags(&mut args, req);
    args
}

fn push_model_flags(args: &mut Vec<String>, req: &ExecutionRequest) {
    if let Some(model) = &req.model {
        args.push(format!("--model={model}"));
    }
    if let Some(flag) = context_length_flag(req.context_length) {
        args.push(flag);
    }
}

/// `--modelContextLength=<n>` for positive `n`; non-positive values are omitted.
pub fn context_length_flag(context_length: Option<i64>) -> Option<String> {
    context_length
        .filter(|n| *n > 0)
        .map(|n| format!("--modelContextLength={n}"))
}
