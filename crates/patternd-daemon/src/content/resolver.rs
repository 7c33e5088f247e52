//! Content resolver.
//!
//! Runs before any command is built so that a slow or failing page fetch
//! never holds an open child-process pipe.

use std::sync::Arc;

use patternd_core::config::FetchStrategy;
use tracing::{debug, info};

use super::fetch::Fetcher;
use crate::error::ExecError;
use crate::request::{ExecutionRequest, SourceKind};

/// Where the generator's input comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Request text, fed verbatim on stdin.
    InlineText(String),
    /// Text of a page fetched in-process, fed on stdin.
    PreFetchedText(String),
    /// Nothing on stdin; the generator receives the URL as an argument.
    DeferToProcessArgs { url: String },
    /// Nothing resolved yet; an external fetch process is piped into the generator.
    PipedFromFetcher { url: String },
}

/// Classifies request input and produces the generator's input source.
pub struct ContentResolver {
    fetcher: Arc<dyn Fetcher>,
    strategy: FetchStrategy,
}

impl ContentResolver {
    pub fn new(fetcher: Arc<dyn Fetcher>, strategy: FetchStrategy) -> Self {
        Self { fetcher, strategy }
    }

    pub async fn resolve(&self, req: &ExecutionRequest) -> Result<ContentSource, ExecError> {
        match req.source_kind {
            SourceKind::Plain => Ok(ContentSource::InlineText(req.input.clone())),
            SourceKind::VideoReference => Ok(ContentSource::DeferToProcessArgs {
                url: req.input.clone(),
            }),
            SourceKind::Url => match self.strategy {
                FetchStrategy::External => Ok(ContentSource::PipedFromFetcher {
                    url: req.input.clone(),
                }),
                FetchStrategy::InProcess => {
                    debug!(request_id = %req.request_id, url = %req.input, "Fetching page");
                    let page = self.fetcher.fetch(&req.input).await?;
                    info!(
                        request_id = %req.request_id,
                        url = %req.input,
                        was_html = page.was_html,
                        chars = page.text.len(),
                        "Resolved page content"
                    );
                    Ok(ContentSource::PreFetchedText(page.text))
                }
            },
        }
    }
}
