//! Safety review of the analysis, followed by the audit write.

use super::generation::generate;
use super::{FragmentSink, Stage, REVIEW_UNAVAILABLE};
use crate::audit::AuditDispatcher;
use crate::core::StageName;
use crate::ports::{AuditRecord, GenerationRequest, TextGenerator};
use crate::state::{ConversationState, Message, PartialState};
use async_trait::async_trait;
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Rewrites the last message so it carries the disclaimer and makes no
/// definitive diagnosis, then raises `safety_cleared`.
pub struct SafetyReviewer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    disclaimer: String,
    audit: AuditDispatcher,
}

impl SafetyReviewer {
    /// Creates a reviewer.
    #[must_use]
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        disclaimer: impl Into<String>,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            generator,
            timeout,
            disclaimer: disclaimer.into(),
            audit,
        }
    }

    /// Builds the review request for the state's last message.
    #[must_use]
    pub fn request(&self, state: &ConversationState) -> GenerationRequest {
        let last = state.last_message().map_or("", |m| m.content.as_str());
        GenerationRequest::new(
            format!(
                "You are a medical ethics reviewer. If the text lacks the disclaimer \
                 \"{}\", append it. Never give a definitive diagnosis.",
                self.disclaimer
            ),
            vec![Message::user(format!("Review and improve this analysis: {last}"))],
        )
    }

    /// Returns the suffix needed to make `text` carry the disclaimer, if any.
    fn missing_disclaimer(&self, text: &str) -> Option<String> {
        if text
            .to_lowercase()
            .contains(&self.disclaimer.to_lowercase())
        {
            None
        } else if text.is_empty() {
            Some(self.disclaimer.clone())
        } else {
            Some(format!("\n\n{}", self.disclaimer))
        }
    }
}

impl fmt::Debug for SafetyReviewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafetyReviewer")
            .field("timeout", &self.timeout)
            .field("disclaimer", &self.disclaimer)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for SafetyReviewer {
    fn name(&self) -> StageName {
        StageName::SafetyReviewer
    }

    async fn apply(&self, state: &ConversationState, sink: Option<&FragmentSink>) -> PartialState {
        let generated = generate(
            StageName::SafetyReviewer,
            self.generator.as_ref(),
            self.request(state),
            self.timeout,
            sink,
            REVIEW_UNAVAILABLE,
        )
        .await;

        let mut reviewed = generated.text;
        if let Some(suffix) = self.missing_disclaimer(&reviewed) {
            debug!(run_id = %state.run_id(), "Appending missing disclaimer");
            if let Some(sink) = sink {
                sink.send(&suffix);
            }
            reviewed.push_str(&suffix);
        }

        self.audit.dispatch(AuditRecord {
            run_id: state.run_id(),
            subject_id: state.subject_id().unwrap_or_default().to_string(),
            stage_name: StageName::SafetyReviewer,
            input_text: state.original_user_input().unwrap_or_default().to_string(),
            output_text: reviewed.clone(),
            timestamp: Utc::now(),
        });
        info!(run_id = %state.run_id(), degraded = generated.degraded, "Safety review complete");

        let partial = PartialState::new(StageName::SafetyReviewer)
            .with_message(Message::assistant(reviewed))
            .with_safety_cleared(true);
        if generated.degraded {
            partial.degraded()
        } else {
            partial
        }
    }
}
