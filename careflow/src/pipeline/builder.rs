//! Pipeline builder with validation.

use super::PipelineRunner;
use crate::audit::AuditDispatcher;
use crate::config::PipelineConfig;
use crate::errors::{CareflowError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::ports::{AuditSink, RecordLookup, TextGenerator};
use crate::stages::{Analyst, Retriever, SafetyReviewer, Stage};
use std::fmt;
use std::sync::Arc;

/// Assembles a [`PipelineRunner`] from its collaborators.
///
/// The record lookup, the text generator and the audit sink are required.
/// Individual stages can be replaced with [`PipelineBuilder::with_stage`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    lookup: Option<Arc<dyn RecordLookup>>,
    generator: Option<Arc<dyn TextGenerator>>,
    audit_sink: Option<Arc<dyn AuditSink>>,
    events: Option<Arc<dyn EventSink>>,
    overrides: Vec<Arc<dyn Stage>>,
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("config", &self.config)
            .field("has_lookup", &self.lookup.is_some())
            .field("has_generator", &self.generator.is_some())
            .field("has_audit_sink", &self.audit_sink.is_some())
            .field("overrides", &self.overrides)
            .finish_non_exhaustive()
    }
}

impl PipelineBuilder {
    /// Creates a builder with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the record lookup used by the retriever.
    #[must_use]
    pub fn with_record_lookup(mut self, lookup: Arc<dyn RecordLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Sets the text generator shared by the analyst and the reviewer.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Sets the audit sink written after each review.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    /// Sets the lifecycle event sink. Defaults to [`NoOpEventSink`].
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Replaces the stage named by `stage.name()`.
    #[must_use]
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.overrides.push(stage);
        self
    }

    /// Validates the configuration and builds the runner.
    ///
    /// # Errors
    ///
    /// Returns [`CareflowError::Config`] if the configuration is invalid or a
    /// required collaborator is missing.
    pub fn build(self) -> Result<PipelineRunner> {
        self.config.validate()?;

        let lookup = self
            .lookup
            .ok_or_else(|| CareflowError::config("a record lookup is required"))?;
        let generator = self
            .generator
            .ok_or_else(|| CareflowError::config("a text generator is required"))?;
        let audit_sink = self
            .audit_sink
            .ok_or_else(|| CareflowError::config("an audit sink is required"))?;

        let audit = AuditDispatcher::new(audit_sink, self.config.audit_timeout());
        let mut stages: [Arc<dyn Stage>; 3] = [
            Arc::new(Retriever::new(lookup, self.config.lookup_timeout())),
            Arc::new(Analyst::new(
                Arc::clone(&generator),
                self.config.generation_timeout(),
            )),
            Arc::new(SafetyReviewer::new(
                generator,
                self.config.generation_timeout(),
                self.config.disclaimer.clone(),
                audit.clone(),
            )),
        ];
        for stage in self.overrides {
            let position = stage.name().position();
            stages[position] = stage;
        }

        Ok(PipelineRunner::new(
            stages,
            self.events.unwrap_or_else(|| Arc::new(NoOpEventSink)),
            audit,
            self.config,
        ))
    }
}
