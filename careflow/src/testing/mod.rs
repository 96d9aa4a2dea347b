//! Testing utilities for careflow pipelines.
//!
//! This module provides:
//! - In-memory collaborators (record lookup, scripted generator, audit sink)
//! - Fixtures for the reference scenario and a ready-made test pipeline

mod fixtures;
mod mocks;

pub use fixtures::{
    jane_doe_lookup, scenario_generator, scenario_state, test_config, TestPipeline,
    SCENARIO_ANALYSIS, SCENARIO_SUBJECT_ID, SCENARIO_SYMPTOMS,
};
pub use mocks::{FailingRecordLookup, RecordingAuditSink, ScriptedGenerator, StaticRecordLookup};
