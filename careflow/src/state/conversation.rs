//! The per-run conversation state.

use super::{Message, PartialState, Role};
use crate::core::{RunPhase, StageName};
use crate::errors::InvariantViolation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Key under which the subject identifier is stored in the subject context.
pub const SUBJECT_ID_KEY: &str = "subject_id";

/// Focus label used when the caller does not supply one.
pub const DEFAULT_FOCUS: &str = "general consultation";

/// Message roles after each phase: the user input, then one per merged stage.
const PHASE_ROLES: [Role; 4] = [Role::User, Role::System, Role::Assistant, Role::Assistant];

/// The record threaded through every stage of one pipeline run.
///
/// Fields are private: the only way to change a state after construction is
/// [`ConversationState::merge`], which enforces append-only messages, field
/// ownership and the linear phase order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    run_id: Uuid,
    messages: Vec<Message>,
    subject_context: BTreeMap<String, String>,
    focus: String,
    safety_cleared: bool,
    #[serde(default)]
    phase: RunPhase,
}

impl ConversationState {
    /// Creates the initial state for a run: one user message, the subject
    /// context and the task focus.
    #[must_use]
    pub fn new(
        subject_id: impl Into<String>,
        user_text: impl Into<String>,
        focus: impl Into<String>,
    ) -> Self {
        let mut subject_context = BTreeMap::new();
        subject_context.insert(SUBJECT_ID_KEY.to_string(), subject_id.into());

        Self {
            run_id: Uuid::new_v4(),
            messages: vec![Message::user(user_text)],
            subject_context,
            focus: focus.into(),
            safety_cleared: false,
            phase: RunPhase::NotStarted,
        }
    }

    /// Sets the run identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::MalformedState`] once a stage has merged.
    pub fn with_run_id(mut self, run_id: Uuid) -> Result<Self, InvariantViolation> {
        self.ensure_not_started("run id")?;
        self.run_id = run_id;
        Ok(self)
    }

    /// Adds an entry to the subject context.
    ///
    /// The subject context is read-only once the run has started.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::MalformedState`] once a stage has merged.
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, InvariantViolation> {
        self.ensure_not_started("subject context")?;
        self.subject_context.insert(key.into(), value.into());
        Ok(self)
    }

    fn ensure_not_started(&self, what: &str) -> Result<(), InvariantViolation> {
        if self.phase == RunPhase::NotStarted {
            Ok(())
        } else {
            Err(InvariantViolation::MalformedState(format!(
                "{what} is read-only after phase '{}'",
                RunPhase::NotStarted
            )))
        }
    }

    /// Checks that the messages and `safety_cleared` match the phase.
    ///
    /// States built through [`ConversationState::merge`] always pass. A
    /// state deserialized from hand-edited JSON may not.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::MalformedState`] describing the mismatch.
    pub fn check_consistency(&self) -> Result<(), InvariantViolation> {
        let merged = self.stages_touched().len();
        let expected = &PHASE_ROLES[..=merged];
        let actual: Vec<Role> = self.messages.iter().map(|m| m.role).collect();
        if actual != expected {
            return Err(InvariantViolation::MalformedState(format!(
                "phase '{}' expects message roles {expected:?}, found {actual:?}",
                self.phase
            )));
        }

        let reviewed = self.phase == RunPhase::Reviewed;
        if self.safety_cleared != reviewed {
            return Err(InvariantViolation::MalformedState(format!(
                "safety_cleared is {} at phase '{}'",
                self.safety_cleared, self.phase
            )));
        }
        Ok(())
    }

    /// Returns the run identifier.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns all messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the most recent message.
    #[must_use]
    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Returns the first user message: the caller's original input.
    #[must_use]
    pub fn original_user_input(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }

    /// Returns the subject context.
    #[must_use]
    pub fn subject_context(&self) -> &BTreeMap<String, String> {
        &self.subject_context
    }

    /// Returns the subject identifier, if present.
    #[must_use]
    pub fn subject_id(&self) -> Option<&str> {
        self.subject_context.get(SUBJECT_ID_KEY).map(String::as_str)
    }

    /// Returns the task focus.
    #[must_use]
    pub fn focus(&self) -> &str {
        &self.focus
    }

    /// Returns true once the safety reviewer has merged.
    #[must_use]
    pub fn safety_cleared(&self) -> bool {
        self.safety_cleared
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Returns the stages merged so far, in order.
    #[must_use]
    pub fn stages_touched(&self) -> Vec<StageName> {
        StageName::SEQUENCE
            .into_iter()
            .filter(|stage| self.phase.has_completed(*stage))
            .collect()
    }

    /// Merges a stage's output into the state.
    ///
    /// Messages are appended; `safety_cleared` is overwritten only when the
    /// partial carries it. The merge is all-or-nothing: on error the state is
    /// left untouched.
    ///
    /// # Errors
    ///
    /// - [`InvariantViolation::DuplicateMerge`] if the stage was already merged
    /// - [`InvariantViolation::OutOfOrderMerge`] if it is not the next stage
    /// - [`InvariantViolation::Ownership`] if the partial breaks ownership rules
    pub fn merge(&mut self, partial: PartialState) -> Result<(), InvariantViolation> {
        let stage = partial.stage();

        if self.phase.has_completed(stage) {
            return Err(InvariantViolation::DuplicateMerge { stage });
        }

        let expected = self.phase.next_stage();
        if expected != Some(stage) {
            return Err(InvariantViolation::OutOfOrderMerge {
                expected,
                actual: stage,
            });
        }

        partial.check_ownership()?;

        let (messages, safety_cleared) = partial.into_parts();
        self.messages.extend(messages);
        if let Some(cleared) = safety_cleared {
            self.safety_cleared = cleared;
        }
        self.phase = stage.completes();

        Ok(())
    }

    /// By-value variant of [`ConversationState::merge`].
    ///
    /// # Errors
    ///
    /// See [`ConversationState::merge`].
    pub fn merged(mut self, partial: PartialState) -> Result<Self, InvariantViolation> {
        self.merge(partial)?;
        Ok(self)
    }
}
