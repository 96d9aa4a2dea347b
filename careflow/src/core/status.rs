//! Stage names and run phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The named stages of the triage pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Fetches the subject's background record.
    Retriever,
    /// Produces the domain analysis.
    Analyst,
    /// Reviews the analysis for safety and triggers the audit write.
    SafetyReviewer,
}

impl StageName {
    /// The fixed edge list, in execution order.
    pub const SEQUENCE: [Self; 3] = [Self::Retriever, Self::Analyst, Self::SafetyReviewer];

    /// Returns the stage name as it appears in events and audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retriever => "retriever",
            Self::Analyst => "analyst",
            Self::SafetyReviewer => "safety_reviewer",
        }
    }

    /// Returns the stage's position in [`StageName::SEQUENCE`].
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::Retriever => 0,
            Self::Analyst => 1,
            Self::SafetyReviewer => 2,
        }
    }

    /// Returns the phase the run enters once this stage has been merged.
    #[must_use]
    pub fn completes(&self) -> RunPhase {
        match self {
            Self::Retriever => RunPhase::Retrieved,
            Self::Analyst => RunPhase::Analyzed,
            Self::SafetyReviewer => RunPhase::Reviewed,
        }
    }

    /// Returns true if the stage calls the text generator.
    #[must_use]
    pub fn generates_text(&self) -> bool {
        matches!(self, Self::Analyst | Self::SafetyReviewer)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a run is in the linear stage sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// No stage has been merged yet.
    #[default]
    NotStarted,
    /// The retriever's context has been merged.
    Retrieved,
    /// The analyst's answer has been merged. This is the checkpoint phase.
    Analyzed,
    /// The reviewed answer has been merged. Terminal.
    Reviewed,
}

impl RunPhase {
    /// Returns the stage that must run next, or `None` when terminal.
    #[must_use]
    pub fn next_stage(&self) -> Option<StageName> {
        match self {
            Self::NotStarted => Some(StageName::Retriever),
            Self::Retrieved => Some(StageName::Analyst),
            Self::Analyzed => Some(StageName::SafetyReviewer),
            Self::Reviewed => None,
        }
    }

    /// Returns true if no further stage can run.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Reviewed)
    }

    /// Returns true if the given stage has already been merged in this phase.
    #[must_use]
    pub fn has_completed(&self, stage: StageName) -> bool {
        *self >= stage.completes()
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Retrieved => write!(f, "retrieved"),
            Self::Analyzed => write!(f, "analyzed"),
            Self::Reviewed => write!(f, "reviewed"),
        }
    }
}
