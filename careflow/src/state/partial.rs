//! Stage outputs and the field-ownership rules that govern merging them.

use super::{Message, Role};
use crate::core::StageName;
use crate::errors::InvariantViolation;
use serde::{Deserialize, Serialize};

/// The subset of state fields a single stage produced.
///
/// Ownership rules checked by [`PartialState::check_ownership`]:
///
/// | stage            | messages                  | `safety_cleared` |
/// |------------------|---------------------------|------------------|
/// | `retriever`      | exactly one `system`      | never            |
/// | `analyst`        | exactly one `assistant`   | never            |
/// | `safety_reviewer`| exactly one `assistant`   | `true` only      |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialState {
    stage: StageName,
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    safety_cleared: Option<bool>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    degraded: bool,
}

impl PartialState {
    /// Creates an empty partial attributed to a stage.
    #[must_use]
    pub fn new(stage: StageName) -> Self {
        Self {
            stage,
            messages: Vec::new(),
            safety_cleared: None,
            degraded: false,
        }
    }

    /// Appends a message.
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Sets the safety flag.
    #[must_use]
    pub fn with_safety_cleared(mut self, cleared: bool) -> Self {
        self.safety_cleared = Some(cleared);
        self
    }

    /// Marks the partial as produced from sentinel text after a collaborator failure.
    #[must_use]
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }

    /// Returns the producing stage.
    #[must_use]
    pub fn stage(&self) -> StageName {
        self.stage
    }

    /// Returns the new messages.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the safety flag, if the stage set it.
    #[must_use]
    pub fn safety_cleared(&self) -> Option<bool> {
        self.safety_cleared
    }

    /// Returns true if the stage fell back to sentinel text.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Verifies that the partial only touches fields its stage owns.
    ///
    /// # Errors
    ///
    /// Returns [`InvariantViolation::Ownership`] describing the first breach.
    pub fn check_ownership(&self) -> Result<(), InvariantViolation> {
        let expected_role = match self.stage {
            StageName::Retriever => Role::System,
            StageName::Analyst | StageName::SafetyReviewer => Role::Assistant,
        };

        if self.messages.len() != 1 {
            return Err(InvariantViolation::ownership(
                self.stage,
                format!("expected exactly one message, got {}", self.messages.len()),
            ));
        }

        if let Some(message) = self.messages.iter().find(|m| m.role != expected_role) {
            return Err(InvariantViolation::ownership(
                self.stage,
                format!("may only append {expected_role} messages, got {}", message.role),
            ));
        }

        match (self.stage, self.safety_cleared) {
            (_, None) | (StageName::SafetyReviewer, Some(true)) => Ok(()),
            (StageName::SafetyReviewer, Some(false)) => Err(InvariantViolation::ownership(
                self.stage,
                "safety_cleared can only be raised, never lowered",
            )),
            (stage, Some(_)) => Err(InvariantViolation::ownership(
                stage,
                "safety_cleared is owned by the safety reviewer",
            )),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<Message>, Option<bool>) {
        (self.messages, self.safety_cleared)
    }
}
