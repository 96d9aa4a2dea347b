//! Lifecycle event sinks.
//!
//! These are operational notifications (run started, stage completed, run
//! failed) for logs and analytics. The caller-facing token stream is
//! [`crate::core::PipelineEvent`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by the runner.
pub mod event_types {
    /// A run began.
    pub const PIPELINE_STARTED: &str = "pipeline.started";
    /// A run parked before the safety reviewer.
    pub const PIPELINE_CHECKPOINTED: &str = "pipeline.checkpointed";
    /// A run reached its terminal phase.
    pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
    /// A run aborted on an error.
    pub const PIPELINE_FAILED: &str = "pipeline.failed";
    /// A stage began.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage's output was merged.
    pub const STAGE_COMPLETED: &str = "stage.completed";
}
