//! In-process web page fetching.
//!
//! Uses reqwest with a fixed timeout ceiling that is independent of the
//! lifetime of the HTTP request being served.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::ExecError;

/// Text payload of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub text: String,
    /// The page was HTML and `text` holds its visible body text.
    pub was_html: bool,
}

/// Fetches a URL and returns its text content.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExecError>;
}

/// reqwest-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, reqwest::Error> {
        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("patternd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, max_bytes })
    }
}

fn fetch_failed(url: &str, reason: impl ToString) -> ExecError {
    ExecError::FetchFailed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

/// Whether a `Content-Type` value denotes an HTML document.
pub fn is_html_content_type(value: &str) -> bool {
    let mime = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "text/html" || mime == "application/xhtml+xml"
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, ExecError> {
        let mut resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(fetch_failed(url, format!("HTTP {status}")));
        }

        let was_html = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_html_content_type);

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(|e| fetch_failed(url, e))? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(fetch_failed(
                    url,
                    format!("response exceeds {} bytes", self.max_bytes),
                ));
            }
            body.extend_from_slice(&chunk);
        }

        let raw = String::from_utf8_lossy(&body);
        let text = if was_html {
            patternd_core::html::visible_text(&raw)
        } else {
            raw.into_owned()
        };
        debug!(url, was_html, bytes = body.len(), chars = text.len(), "Fetched page");

        Ok(FetchedPage { text, was_html })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    /// Serve a few canned pages on an ephemeral port and return its base URL.
    async fn serve_pages() -> String {
        let app = Router::new()
            .route(
                "/page",
                get(|| async {
                    (
                        [("content-type", "text/html; charset=utf-8")],
                        "<html><head><title>T</title></head><body><nav>menu</nav>\
                         <p>Hello &amp; welcome</p><script>track()</script></body></html>",
                    )
                }),
            )
            .route(
                "/plain",
                get(|| async { ([("content-type", "text/plain")], "plain text body") }),
            )
            .route("/big", get(|| async { "x".repeat(4096) }))
            .route("/missing", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(Duration::from_secs(5), 1024).unwrap()
    }

    #[tokio::test]
    async fn html_is_reduced_to_visible_text() {
        let base = serve_pages().await;
        let page = fetcher().fetch(&format!("{base}/page")).await.unwrap();
        assert!(page.was_html);
        assert_eq!(page.text, "Hello & welcome");
    }

    #[tokio::test]
    async fn non_html_passes_through_verbatim() {
        let base = serve_pages().await;
        let page = fetcher().fetch(&format!("{base}/plain")).await.unwrap();
        assert!(!page.was_html);
        assert_eq!(page.text, "plain text body");
    }

    #[tokio::test]
    async fn error_status_is_fetch_failure() {
        let base = serve_pages().await;
        let err = fetcher().fetch(&format!("{base}/missing")).await.unwrap_err();
        match err {
            ExecError::FetchFailed { reason, .. } => assert!(reason.contains("404"), "{reason}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_body_is_fetch_failure() {
        let base = serve_pages().await;
        let err = fetcher().fetch(&format!("{base}/big")).await.unwrap_err();
        assert!(matches!(err, ExecError::FetchFailed { .. }));
    }

    #[test]
    fn html_content_types() {
        assert!(is_html_content_type("text/html"));
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("TEXT/HTML"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("text/plain"));
        assert!(!is_html_content_type("application/json"));
        assert!(!is_html_content_type(""));
    }
}
