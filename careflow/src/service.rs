//! Caller-facing entry point: triage requests in, outcomes or event streams out.

use crate::core::StageName;
use crate::errors::{CareflowError, Result, ValidationError};
use crate::pipeline::{EventStream, PipelineRunner};
use crate::state::ConversationState;
use futures::stream;
use serde::{Deserialize, Serialize};

/// Context key under which the urgency level is recorded.
pub const URGENCY_KEY: &str = "urgency_level";

/// A request to triage one subject's symptoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TriageRequest {
    /// Whose record to consult.
    #[serde(alias = "patientId", alias = "patient_id")]
    pub subject_id: String,
    /// The caller's description of the problem.
    #[serde(alias = "symptoms")]
    pub user_text: String,
    /// Task focus; the configured default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    /// Urgency from 1 (lowest) to 5 (highest).
    #[serde(default, alias = "urgencyLevel", skip_serializing_if = "Option::is_none")]
    pub urgency_level: Option<u8>,
    /// Whether the subject consented to the analysis.
    #[serde(alias = "consentProvided")]
    pub consent_provided: bool,
}

impl TriageRequest {
    /// Creates a consented request without focus or urgency.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, user_text: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            user_text: user_text.into(),
            focus: None,
            urgency_level: None,
            consent_provided: true,
        }
    }

    /// Sets the focus.
    #[must_use]
    pub fn with_focus(mut self, focus: impl Into<String>) -> Self {
        self.focus = Some(focus.into());
        self
    }

    /// Sets the urgency level.
    #[must_use]
    pub fn with_urgency(mut self, level: u8) -> Self {
        self.urgency_level = Some(level);
        self
    }

    /// Marks the request as lacking consent.
    #[must_use]
    pub fn without_consent(mut self) -> Self {
        self.consent_provided = false;
        self
    }

    /// Checks the request before any stage runs.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.subject_id.trim().is_empty() {
            return Err(ValidationError::new("subject_id", "must not be empty"));
        }
        if self.user_text.trim().is_empty() {
            return Err(ValidationError::new("user_text", "must not be empty"));
        }
        if self.focus.as_deref().is_some_and(|f| f.trim().is_empty()) {
            return Err(ValidationError::new("focus", "must not be empty when given"));
        }
        if let Some(level) = self.urgency_level {
            if !(1..=5).contains(&level) {
                return Err(ValidationError::new(
                    "urgency_level",
                    format!("must be between 1 and 5, got {level}"),
                ));
            }
        }
        if !self.consent_provided {
            return Err(ValidationError::new("consent_provided", "consent is required"));
        }
        Ok(())
    }
}

/// The answer to a triage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageOutcome {
    /// The final, reviewed answer.
    pub analysis_text: String,
    /// Stages merged during the run, in order.
    pub stages_touched: Vec<StageName>,
    /// The stage that authored the final answer.
    pub agent_in_charge: StageName,
    /// Configured follow-up actions.
    pub recommended_actions: Vec<String>,
    /// Whether the safety review ran.
    pub safety_cleared: bool,
}

/// Validates requests and runs them through a [`PipelineRunner`].
#[derive(Debug, Clone)]
pub struct TriageService {
    runner: PipelineRunner,
}

impl TriageService {
    /// Creates a service over `runner`.
    #[must_use]
    pub fn new(runner: PipelineRunner) -> Self {
        Self { runner }
    }

    /// Returns the underlying runner.
    #[must_use]
    pub fn runner(&self) -> &PipelineRunner {
        &self.runner
    }

    /// Builds the initial state for a validated request.
    ///
    /// # Errors
    ///
    /// Returns [`CareflowError::Validation`] if the request is invalid.
    pub fn initial_state(&self, request: &TriageRequest) -> Result<ConversationState> {
        request.validate()?;

        let focus = request
            .focus
            .clone()
            .unwrap_or_else(|| self.runner.config().default_focus.clone());
        let mut state =
            ConversationState::new(request.subject_id.trim(), request.user_text.clone(), focus);
        if let Some(level) = request.urgency_level {
            state = state.with_context(URGENCY_KEY, level.to_string())?;
        }
        Ok(state)
    }

    /// Runs a request to completion.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid request, or an internal
    /// error if the pipeline contract is broken.
    pub async fn analyze(&self, request: &TriageRequest) -> Result<TriageOutcome> {
        let state = self.runner.run_to_completion(self.initial_state(request)?).await?;
        Ok(self.outcome(&state))
    }

    /// Runs a request as an event stream ending in `RunCompleted`.
    ///
    /// An invalid request yields a single `Err` item.
    #[must_use]
    pub fn analyze_stream(&self, request: &TriageRequest) -> EventStream {
        match self.initial_state(request) {
            Ok(state) => self.runner.stream(state),
            Err(err) => Box::pin(stream::once(async move { Err::<_, CareflowError>(err) })),
        }
    }

    fn outcome(&self, state: &ConversationState) -> TriageOutcome {
        TriageOutcome {
            analysis_text: state
                .last_message()
                .map(|m| m.content.clone())
                .unwrap_or_default(),
            stages_touched: state.stages_touched(),
            agent_in_charge: if state.safety_cleared() {
                StageName::SafetyReviewer
            } else {
                StageName::Analyst
            },
            recommended_actions: self.runner.config().recommended_actions.clone(),
            safety_cleared: state.safety_cleared(),
        }
    }
}
