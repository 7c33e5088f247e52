//! Named pattern lookup routes.

use axum::Json;
use axum::extract::{Path, State};
use patternd_core::Pattern;

use super::AppState;
use super::error::ApiError;

/// `GET /patterns/{name}`
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Pattern>, ApiError> {
    Ok(Json(state.patterns.get(&name)?))
}

/// `GET /patterns`
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.patterns.names()?))
}
