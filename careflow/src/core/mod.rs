//! Core domain model types for careflow.
//!
//! This module contains the fundamental types used throughout the crate:
//! - Stage names and the linear run phases
//! - The closed set of events surfaced by a streaming run

mod event;
mod status;

pub use event::PipelineEvent;
pub use status::{RunPhase, StageName};
