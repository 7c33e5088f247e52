//! Server-sent event delivery of relayed output.
//!
//! The relay and the HTTP body meet at a rendezvous channel: every event is
//! handed over together with an acknowledgement that the body stream sends
//! only once axum asks for the following frame. A slow client therefore
//! slows down how fast the generator's stdout is drained.

use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderName;
use axum::http::header::{CACHE_CONTROL, CONNECTION};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::executor::Executor;
use crate::relay::{EventSink, RelayEvent, SinkClosed};
use crate::subprocess::PipelineHandle;

type Delivery = (RelayEvent, oneshot::Sender<()>);

/// [`EventSink`] feeding an SSE response body.
#[derive(Clone)]
pub struct SseSink {
    tx: mpsc::Sender<Delivery>,
}

#[async_trait]
impl EventSink for SseSink {
    async fn emit(&mut self, event: RelayEvent) -> Result<(), SinkClosed> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx.send((event, ack_tx)).await.map_err(|_| SinkClosed)?;
        ack_rx.await.map_err(|_| SinkClosed)
    }
}

/// Convert a relay event into a named SSE frame.
pub fn to_sse_event(event: &RelayEvent) -> Event {
    let frame = match event {
        RelayEvent::Content { sequence, line } => Event::default()
            .event("message")
            .id(sequence.to_string())
            .json_data(json!({ "content": line })),
        RelayEvent::Error { message } => Event::default()
            .event("error")
            .json_data(json!({ "error": message })),
    };
    frame.unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Start relaying `handle` and return the streaming response.
///
/// Dropping the response body (client disconnect) cancels the relay, which
/// kills the pipeline.
pub fn respond(
    executor: Arc<Executor>,
    handle: PipelineHandle,
    span: tracing::Span,
) -> Response {
    let (tx, mut rx) = mpsc::channel::<Delivery>(1);
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    tokio::spawn(
        async move {
            executor.run_streaming(handle, SseSink { tx }, cancel).await;
        }
        .instrument(span),
    );

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some((event, ack)) = rx.recv().await {
            yield Ok::<_, Infallible>(to_sse_event(&event));
            let _ = ack.send(());
        }
    };

    (
        [
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}
