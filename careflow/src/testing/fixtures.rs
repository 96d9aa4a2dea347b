//! Test fixtures for pipeline testing.

use std::sync::Arc;
use std::time::Duration;

use super::mocks::{RecordingAuditSink, ScriptedGenerator, StaticRecordLookup};
use crate::config::{PipelineConfig, DEFAULT_DISCLAIMER};
use crate::pipeline::{PipelineBuilder, PipelineRunner};
use crate::ports::{RecordLookup, SubjectRecord};
use crate::state::{ConversationState, DEFAULT_FOCUS};

/// Subject id of the reference scenario.
pub const SCENARIO_SUBJECT_ID: &str = "PAC-001";

/// User input of the reference scenario.
pub const SCENARIO_SYMPTOMS: &str = "severe chest pain";

/// Analysis returned by [`scenario_generator`].
pub const SCENARIO_ANALYSIS: &str =
    "Chest pain with a history of hypertension warrants urgent cardiac evaluation.";

/// A lookup that knows Jane Doe (`PAC-001`, hypertension).
#[must_use]
pub fn jane_doe_lookup() -> StaticRecordLookup {
    StaticRecordLookup::new().with_record(
        SCENARIO_SUBJECT_ID,
        SubjectRecord::new("Jane Doe", "hypertension"),
    )
}

/// A generator scripted for one run: the analysis, then a review that
/// already carries the default disclaimer.
#[must_use]
pub fn scenario_generator() -> ScriptedGenerator {
    ScriptedGenerator::new()
        .with_fragments(["Chest pain with a history of hypertension ", "warrants urgent cardiac evaluation."])
        .with_fragments([
            "Chest pain with hypertension may indicate a cardiac cause. ".to_string(),
            DEFAULT_DISCLAIMER.to_string(),
        ])
}

/// The initial state of the reference scenario.
#[must_use]
pub fn scenario_state() -> ConversationState {
    ConversationState::new(SCENARIO_SUBJECT_ID, SCENARIO_SYMPTOMS, DEFAULT_FOCUS)
}

/// A configuration with short timeouts suitable for tests.
#[must_use]
pub fn test_config() -> PipelineConfig {
    PipelineConfig::default()
        .with_lookup_timeout(Duration::from_millis(100))
        .with_generation_timeout(Duration::from_millis(500))
        .with_audit_timeout(Duration::from_millis(100))
}

/// Collaborators of one test pipeline, kept around for inspection.
#[derive(Debug)]
pub struct TestPipeline {
    /// The runner under test.
    pub runner: PipelineRunner,
    /// The generator shared by the analyst and the reviewer.
    pub generator: Arc<ScriptedGenerator>,
    /// The audit sink.
    pub audit: Arc<RecordingAuditSink>,
}

impl TestPipeline {
    /// Builds a runner from the given collaborators and [`test_config`].
    ///
    /// # Panics
    ///
    /// Panics if the builder rejects the configuration.
    #[must_use]
    pub fn new(lookup: Arc<dyn RecordLookup>, generator: ScriptedGenerator) -> Self {
        Self::with_config(lookup, generator, test_config())
    }

    /// Builds a runner with an explicit configuration.
    ///
    /// # Panics
    ///
    /// Panics if the builder rejects the configuration.
    #[must_use]
    pub fn with_config(
        lookup: Arc<dyn RecordLookup>,
        generator: ScriptedGenerator,
        config: PipelineConfig,
    ) -> Self {
        let generator = Arc::new(generator);
        let audit = Arc::new(RecordingAuditSink::new());
        #[allow(clippy::expect_used)]
        let runner = PipelineBuilder::new()
            .with_config(config)
            .with_record_lookup(lookup)
            .with_generator(generator.clone())
            .with_audit_sink(audit.clone())
            .build()
            .expect("test pipeline must build");

        Self {
            runner,
            generator,
            audit,
        }
    }

    /// The reference scenario: Jane Doe with the scripted analysis and review.
    #[must_use]
    pub fn scenario() -> Self {
        Self::new(Arc::new(jane_doe_lookup()), scenario_generator())
    }
}
