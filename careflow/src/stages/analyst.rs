//! Domain analysis over the full conversation.

use super::generation::generate;
use super::{FragmentSink, Stage, ANALYSIS_UNAVAILABLE};
use crate::core::StageName;
use crate::ports::{GenerationRequest, TextGenerator};
use crate::state::{ConversationState, Message, PartialState};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Produces one assistant message analysing the conversation under the
/// state's focus.
pub struct Analyst {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
}

impl Analyst {
    /// Creates an analyst bounded by `timeout` per generation call.
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self { generator, timeout }
    }

    /// Builds the generation request: a system instruction embedding the
    /// focus, followed by every message so far.
    #[must_use]
    pub fn request(state: &ConversationState) -> GenerationRequest {
        GenerationRequest::new(
            format!(
                "You are an expert medical analyst. Your current focus is: {}.",
                state.focus()
            ),
            state.messages().to_vec(),
        )
    }
}

impl fmt::Debug for Analyst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyst")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for Analyst {
    fn name(&self) -> StageName {
        StageName::Analyst
    }

    async fn apply(&self, state: &ConversationState, sink: Option<&FragmentSink>) -> PartialState {
        let generated = generate(
            StageName::Analyst,
            self.generator.as_ref(),
            Self::request(state),
            self.timeout,
            sink,
            ANALYSIS_UNAVAILABLE,
        )
        .await;
        debug!(run_id = %state.run_id(), chars = generated.text.len(), "Analysis generated");

        let partial =
            PartialState::new(StageName::Analyst).with_message(Message::assistant(generated.text));
        if generated.degraded {
            partial.degraded()
        } else {
            partial
        }
    }
}
