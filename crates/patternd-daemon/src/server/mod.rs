//! HTTP server exposing pattern execution.

pub mod config;
pub mod error;
mod execute;
mod health;
mod patterns;
pub mod sse;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use patternd_core::PatternStore;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use config::ServerConfig;
pub use error::ApiError;

use crate::executor::Executor;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub patterns: Arc<dyn PatternStore>,
}

impl AppState {
    pub fn new(executor: Executor, patterns: impl PatternStore + 'static) -> Self {
        Self {
            executor: Arc::new(executor),
            patterns: Arc::new(patterns),
        }
    }
}

/// Build the application router.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/patterns", get(patterns::list))
        .route("/patterns/{name}", get(patterns::get))
        .route("/patterns/{name}/execute", post(execute::execute))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `config.addr` until `shutdown` resolves.
///
/// In-flight requests are allowed to finish after `shutdown`.
pub async fn serve(
    router: Router,
    config: &ServerConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
