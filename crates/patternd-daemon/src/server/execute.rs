//! `POST /patterns/{name}/execute`.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::{Instrument, info, info_span};

use super::AppState;
use super::error::ApiError;
use super::sse;
use crate::error::ExecError;
use crate::request::ExecuteBody;

/// Run a pattern against the request input.
///
/// Buffered requests answer `{"content": ...}`; streaming requests answer
/// with an SSE stream once the generator has started.
pub async fn execute(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<ExecuteBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload.map_err(|e| match e.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::new(e.status(), e.body_text()),
        _ => ExecError::malformed(e.body_text()).into(),
    })?;
    let req = state.executor.request(&name, body)?;
    if state.executor.uses_pattern(&req) {
        state.patterns.get(&req.pattern)?;
    }

    let span = info_span!("execute", request_id = %req.request_id, pattern = %req.pattern);
    async move {
        info!(
            streaming = req.streaming,
            source = ?req.source_kind,
            model = req.model.as_deref(),
            "Executing pattern"
        );
        if req.streaming {
            let handle = state.executor.prepare(&req).await?;
            return Ok(sse::respond(
                Arc::clone(&state.executor),
                handle,
                tracing::Span::current(),
            ));
        }
        let content = state.executor.run_buffered(&req).await?;
        info!(bytes = content.len(), "Execution finished");
        Ok::<_, ApiError>(Json(json!({ "content": content })).into_response())
    }
    .instrument(span)
    .await
}
