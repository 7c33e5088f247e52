//! patternd Daemon Library
//!
//! Core functionality for the patternd daemon:
//! - Request classification and content resolution (inline text, fetched pages, video links)
//! - Generator command construction
//! - Child process pipelines with optional chained fetch process
//! - Ordered live relay of generator output
//! - HTTP server exposing pattern execution

pub mod content;
pub mod error;
pub mod executor;
pub mod relay;
pub mod request;
pub mod server;
pub mod subprocess;

pub use error::ExecError;
pub use executor::Executor;
pub use request::{ExecuteBody, ExecutionRequest, SourceKind};
