//! `patternd` Core Library
//!
//! Shared functionality for `patternd` components:
//! - Configuration resolution and hierarchy
//! - Named pattern storage
//! - Visible-text extraction from fetched HTML
//! - Common error types

pub mod config;
pub mod error;
pub mod html;
pub mod patterns;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use patterns::{FsPatternStore, Pattern, PatternStore};
