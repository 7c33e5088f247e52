//! Output relay and response finalisation.

pub mod finalize;
mod stream;
mod types;

pub use stream::StreamRelay;
pub use types::{
    DiagnosticSink, EventSink, RelayEvent, RelayOutcome, SinkClosed, TracingDiagnostics,
};
