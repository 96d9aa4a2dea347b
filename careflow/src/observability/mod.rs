//! Observability utilities.

mod telemetry;

pub use telemetry::{init_tracing, run_span, stage_span, LogFormat, SpanTimer};
