//! Pipeline building and execution.
//!
//! This module provides:
//! - The validated [`PipelineBuilder`]
//! - The [`PipelineRunner`] with run-to-completion, checkpoint and resume
//! - Lazy event streams over a run
//! - The serializable [`Checkpoint`]

mod builder;
mod checkpoint;
#[cfg(test)]
mod integration_tests;
mod runner;
mod stream;

pub use builder::PipelineBuilder;
pub use checkpoint::Checkpoint;
pub use runner::PipelineRunner;
pub use stream::EventStream;
