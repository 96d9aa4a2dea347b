//! Structured logging setup and span helpers for pipeline runs.

use crate::core::StageName;
use crate::errors::{CareflowError, Result};
use std::time::Instant;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`.
///
/// # Errors
///
/// Returns a config error if the filter is invalid or a subscriber is
/// already installed.
pub fn init_tracing(format: LogFormat, default_filter: &str) -> Result<()> {
    let filter = build_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok(), default_filter)?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };
    installed.map_err(|e| CareflowError::config(format!("tracing already initialised: {e}")))
}

fn build_filter(directives: Option<String>, default_filter: &str) -> Result<EnvFilter> {
    match directives {
        Some(directives) if !directives.is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(default_filter),
    }
    .map_err(|e| CareflowError::config(format!("invalid log filter: {e}")))
}

/// Span covering one pipeline run.
#[must_use]
pub fn run_span(run_id: Uuid, mode: &'static str) -> Span {
    tracing::info_span!("pipeline_run", %run_id, mode)
}

/// Span covering one stage of a run.
#[must_use]
pub fn stage_span(run_id: Uuid, stage: StageName) -> Span {
    tracing::info_span!("stage", %run_id, stage = stage.as_str())
}

/// Measures how long a stage took.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    stage: StageName,
}

impl SpanTimer {
    /// Starts timing `stage`.
    #[must_use]
    pub fn start(stage: StageName) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Returns the timed stage.
    #[must_use]
    pub fn stage(&self) -> StageName {
        self.stage
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
