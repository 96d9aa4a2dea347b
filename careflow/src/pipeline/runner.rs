//! Sequential execution of the stage sequence.

use super::Checkpoint;
use crate::audit::AuditDispatcher;
use crate::config::PipelineConfig;
use crate::core::{RunPhase, StageName};
use crate::errors::{CareflowError, InvariantViolation, Result, ValidationError};
use crate::events::{event_types, EventSink};
use crate::observability::{run_span, stage_span, SpanTimer};
use crate::stages::Stage;
use crate::state::ConversationState;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, Instrument};
use uuid::Uuid;

/// Runs `Retriever → Analyst → SafetyReviewer` over a conversation state.
///
/// The runner holds only shared, stateless collaborators, so one instance
/// serves any number of concurrent runs. Cloning is cheap.
#[derive(Clone)]
pub struct PipelineRunner {
    pub(super) stages: [Arc<dyn Stage>; 3],
    pub(super) events: Arc<dyn EventSink>,
    audit: AuditDispatcher,
    config: Arc<PipelineConfig>,
}

impl fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("stages", &self.stages)
            .field("audit", &self.audit)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PipelineRunner {
    pub(super) fn new(
        stages: [Arc<dyn Stage>; 3],
        events: Arc<dyn EventSink>,
        audit: AuditDispatcher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            stages,
            events,
            audit,
            config: Arc::new(config),
        }
    }

    /// Returns the stage registered under `name`.
    #[must_use]
    pub fn stage(&self, name: StageName) -> &Arc<dyn Stage> {
        &self.stages[name.position()]
    }

    /// Returns the configuration the runner was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the audit dispatcher, e.g. to flush outstanding writes.
    #[must_use]
    pub fn audit(&self) -> &AuditDispatcher {
        &self.audit
    }

    /// Runs every stage and returns the terminal state.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unusable initial state, or an
    /// invariant violation if a stage breaks the merge contract.
    pub async fn run_to_completion(&self, mut state: ConversationState) -> Result<ConversationState> {
        self.begin_run(&state)?;
        let run_id = state.run_id();

        self.run_stages(&mut state, &StageName::SEQUENCE)
            .instrument(run_span(run_id, "completion"))
            .await?;
        self.emit_completed(&state);
        Ok(state)
    }

    /// Runs the retriever and the analyst, then parks the run.
    ///
    /// # Errors
    ///
    /// See [`PipelineRunner::run_to_completion`].
    pub async fn run_with_checkpoint(&self, mut state: ConversationState) -> Result<Checkpoint> {
        self.begin_run(&state)?;
        let run_id = state.run_id();

        self.run_stages(&mut state, &[StageName::Retriever, StageName::Analyst])
            .instrument(run_span(run_id, "checkpoint"))
            .await?;

        let checkpoint = Checkpoint::new(state)?;
        self.events.try_emit(
            event_types::PIPELINE_CHECKPOINTED,
            Some(json!({ "run_id": run_id.to_string(), "phase": checkpoint.state().phase() })),
        );
        info!(%run_id, "Run parked before safety review");
        Ok(checkpoint)
    }

    /// Runs the safety reviewer on a parked run and returns the terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::InvalidResume`] if the checkpoint is not
    /// parked at [`Checkpoint::PHASE`].
    pub async fn resume(&self, checkpoint: Checkpoint) -> Result<ConversationState> {
        let mut state = checkpoint.into_state()?;
        let run_id = state.run_id();

        self.run_stages(&mut state, &[StageName::SafetyReviewer])
            .instrument(run_span(run_id, "resume"))
            .await?;
        self.emit_completed(&state);
        Ok(state)
    }

    /// Checks that a state can start a run and announces the run.
    pub(super) fn begin_run(&self, state: &ConversationState) -> Result<()> {
        if state.phase() != RunPhase::NotStarted {
            return Err(InvariantViolation::MalformedState(format!(
                "a run must start at phase '{}', found '{}'",
                RunPhase::NotStarted,
                state.phase()
            ))
            .into());
        }
        state.check_consistency()?;
        if state.subject_id().map_or(true, |id| id.trim().is_empty()) {
            return Err(ValidationError::new("subject_id", "must not be empty").into());
        }
        if state.original_user_input().map_or(true, |text| text.trim().is_empty()) {
            return Err(ValidationError::new("user_text", "must not be empty").into());
        }
        if state.focus().trim().is_empty() {
            return Err(ValidationError::new("focus", "must not be empty").into());
        }

        self.events.try_emit(
            event_types::PIPELINE_STARTED,
            Some(json!({ "run_id": state.run_id().to_string() })),
        );
        Ok(())
    }

    async fn run_stages(&self, state: &mut ConversationState, stages: &[StageName]) -> Result<()> {
        for &stage in stages {
            let span = stage_span(state.run_id(), stage);
            if let Err(err) = self.run_stage(state, stage).instrument(span).await {
                self.emit_failed(state.run_id(), stage, &err);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn run_stage(&self, state: &mut ConversationState, stage: StageName) -> Result<()> {
        let timer = SpanTimer::start(stage);
        self.emit_stage_started(state.run_id(), stage);

        let partial = self.stage(stage).apply(state, None).await;
        let degraded = partial.is_degraded();
        state.merge(partial)?;

        self.emit_stage_completed(state.run_id(), &timer, degraded);
        Ok(())
    }

    pub(super) fn emit_stage_started(&self, run_id: Uuid, stage: StageName) {
        self.events.try_emit(
            event_types::STAGE_STARTED,
            Some(json!({ "run_id": run_id.to_string(), "stage": stage })),
        );
    }

    pub(super) fn emit_stage_completed(&self, run_id: Uuid, timer: &SpanTimer, degraded: bool) {
        let duration_ms = timer.elapsed_ms();
        info!(%run_id, stage = %timer.stage(), degraded, duration_ms, "Stage merged");
        self.events.try_emit(
            event_types::STAGE_COMPLETED,
            Some(json!({
                "run_id": run_id.to_string(),
                "stage": timer.stage(),
                "degraded": degraded,
                "duration_ms": duration_ms,
            })),
        );
    }

    pub(super) fn emit_completed(&self, state: &ConversationState) {
        info!(
            run_id = %state.run_id(),
            safety_cleared = state.safety_cleared(),
            messages = state.messages().len(),
            "Run completed"
        );
        self.events.try_emit(
            event_types::PIPELINE_COMPLETED,
            Some(json!({
                "run_id": state.run_id().to_string(),
                "stages_touched": state.stages_touched(),
                "safety_cleared": state.safety_cleared(),
            })),
        );
    }

    pub(super) fn emit_failed(&self, run_id: Uuid, stage: StageName, err: &CareflowError) {
        error!(%run_id, %stage, error = %err, "Run aborted");
        self.events.try_emit(
            event_types::PIPELINE_FAILED,
            Some(json!({
                "run_id": run_id.to_string(),
                "stage": stage,
                "error": err.to_dict(),
            })),
        );
    }
}
