//! # Careflow
//!
//! A staged triage pipeline for conversational health-advice requests.
//!
//! Every run moves through three fixed stages over a shared conversation state:
//!
//! - **Retriever**: looks up the subject's record and adds it as context
//! - **Analyst**: produces a focused analysis with a text generator
//! - **Safety reviewer**: rewrites the analysis, guarantees a disclaimer and
//!   writes an audit record
//!
//! Stages return partial updates which the runner merges in order. Runs can
//! complete in one call, park after analysis in a serializable
//! [`pipeline::Checkpoint`], or stream incremental text as
//! [`core::PipelineEvent`]s.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use careflow::prelude::*;
//!
//! let runner = PipelineBuilder::new()
//!     .with_config(PipelineConfig::default())
//!     .with_record_lookup(lookup)
//!     .with_generator(generator)
//!     .with_audit_sink(audit)
//!     .build()?;
//!
//! let service = TriageService::new(runner);
//! let outcome = service
//!     .analyze(&TriageRequest::new("PAC-001", "severe chest pain"))
//!     .await?;
//! println!("{}", outcome.analysis_text);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod helpers;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod service;
pub mod stages;
pub mod state;
pub mod testing;

#[cfg(feature = "http")]
pub mod http;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::AuditDispatcher;
    pub use crate::config::{HttpConfig, PipelineConfig, DEFAULT_DISCLAIMER};
    pub use crate::core::{PipelineEvent, RunPhase, StageName};
    pub use crate::errors::{
        CareflowError, CollaboratorError, InvariantViolation, ValidationError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{Checkpoint, EventStream, PipelineBuilder, PipelineRunner};
    pub use crate::ports::{
        AuditRecord, AuditSink, GenerationRequest, RecordLookup, SubjectRecord, TextGenerator,
    };
    pub use crate::service::{TriageOutcome, TriageRequest, TriageService};
    pub use crate::stages::{FragmentSink, Stage};
    pub use crate::state::{ConversationState, Message, PartialState, Role};
}
