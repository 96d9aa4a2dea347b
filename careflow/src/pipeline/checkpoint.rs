//! The pause point before the safety reviewer.

use crate::core::RunPhase;
use crate::errors::{InvariantViolation, Result};
use crate::state::ConversationState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A run parked after the analyst, before the safety reviewer.
///
/// The checkpoint owns the state; it can be kept in memory or serialized
/// and resumed later without any handle to the original run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    state: ConversationState,
    created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// The phase a resumable checkpoint is parked at.
    pub const PHASE: RunPhase = RunPhase::Analyzed;

    /// Parks `state`. Only the runner creates checkpoints.
    pub(crate) fn new(state: ConversationState) -> Result<Self, InvariantViolation> {
        Self::check_resumable(&state)?;
        Ok(Self {
            state,
            created_at: Utc::now(),
        })
    }

    /// Returns the parked state.
    #[must_use]
    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.state.run_id()
    }

    /// Returns when the run was parked.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the parked state, checking it is still resumable.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::InvalidResume`] if the state is not at
    /// [`Checkpoint::PHASE`], or [`InvariantViolation::MalformedState`] if its
    /// messages or `safety_cleared` do not match that phase. Both can happen
    /// for hand-edited JSON.
    pub fn into_state(self) -> Result<ConversationState, InvariantViolation> {
        Self::check_resumable(&self.state)?;
        Ok(self.state)
    }

    /// Serializes the checkpoint.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserializes a checkpoint. The phase is checked on resume.
    ///
    /// # Errors
    ///
    /// Returns a serialization error for malformed input.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn check_resumable(state: &ConversationState) -> Result<(), InvariantViolation> {
        if state.phase() != Self::PHASE {
            return Err(InvariantViolation::InvalidResume {
                expected: Self::PHASE,
                actual: state.phase(),
            });
        }
        state.check_consistency()
    }
}
