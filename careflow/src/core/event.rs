//! Events surfaced to callers of a streaming run.

use super::StageName;
use serde::{Deserialize, Serialize};

/// An event yielded by a streaming pipeline run.
///
/// The set of events is closed; consumers match exhaustively rather than
/// comparing event-type strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// An incremental piece of generated text, in generation order.
    TokenFragment {
        /// The stage whose generation call produced the fragment.
        stage: StageName,
        /// The fragment text.
        text: String,
    },

    /// A stage's partial state has been merged.
    StageCompleted {
        /// The stage that completed.
        stage: StageName,
    },

    /// The run reached its terminal phase. Always the last event.
    RunCompleted {
        /// Content of the final message.
        analysis_text: String,
        /// Every stage merged into the state, in order.
        stages_touched: Vec<StageName>,
    },
}

impl PipelineEvent {
    /// Creates a token fragment event.
    #[must_use]
    pub fn fragment(stage: StageName, text: impl Into<String>) -> Self {
        Self::TokenFragment {
            stage,
            text: text.into(),
        }
    }

    /// Returns the fragment text if this is a token fragment.
    #[must_use]
    pub fn fragment_text(&self) -> Option<&str> {
        match self {
            Self::TokenFragment { text, .. } => Some(text),
            Self::StageCompleted { .. } | Self::RunCompleted { .. } => None,
        }
    }

    /// Returns the stage the event belongs to, if any.
    #[must_use]
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::TokenFragment { stage, .. } | Self::StageCompleted { stage } => Some(*stage),
            Self::RunCompleted { .. } => None,
        }
    }

    /// Returns true for the terminal event.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunCompleted { .. })
    }

    /// Renders the event as a Server-Sent Events frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be serialized.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fragment_accessors() {
        let event = PipelineEvent::fragment(StageName::Analyst, "chest");
        assert_eq!(event.fragment_text(), Some("chest"));
        assert_eq!(event.stage(), Some(StageName::Analyst));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_run_completed_is_terminal() {
        let event = PipelineEvent::RunCompleted {
            analysis_text: "done".to_string(),
            stages_touched: StageName::SEQUENCE.to_vec(),
        };
        assert!(event.is_terminal());
        assert_eq!(event.stage(), None);
        assert_eq!(event.fragment_text(), None);
    }

    #[test]
    fn test_sse_frame_format() {
        let event = PipelineEvent::StageCompleted {
            stage: StageName::Retriever,
        };
        let frame = event.to_sse_frame().unwrap();

        assert_eq!(
            frame,
            "data: {\"event\":\"stage_completed\",\"stage\":\"retriever\"}\n\n"
        );
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"event":"token_fragment","stage":"safety_reviewer","text":"ok"}"#;
        let event: PipelineEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event, PipelineEvent::fragment(StageName::SafetyReviewer, "ok"));
    }
}
