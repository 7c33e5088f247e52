//! Generator command construction and child process management.

pub mod command;
pub mod pipeline;

pub use command::{CommandBuilder, CommandSpec, PredecessorSpec, StdinSource};
pub use pipeline::PipelineHandle;
