//! Context retrieval: injects the subject's background record.

use super::{FragmentSink, Stage, CONTEXT_UNAVAILABLE};
use crate::core::StageName;
use crate::helpers::call_with_timeout;
use crate::ports::RecordLookup;
use crate::state::{ConversationState, Message, PartialState};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const COLLABORATOR: &str = "record lookup";

/// Looks up the subject and adds one system message describing them.
pub struct Retriever {
    lookup: Arc<dyn RecordLookup>,
    timeout: Duration,
}

impl Retriever {
    /// Creates a retriever bounded by `timeout` per lookup.
    #[must_use]
    pub fn new(lookup: Arc<dyn RecordLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }
}

impl fmt::Debug for Retriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retriever")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Stage for Retriever {
    fn name(&self) -> StageName {
        StageName::Retriever
    }

    async fn apply(&self, state: &ConversationState, _sink: Option<&FragmentSink>) -> PartialState {
        let partial = PartialState::new(StageName::Retriever);

        let Some(subject_id) = state.subject_id() else {
            warn!(run_id = %state.run_id(), "No subject id in context; using sentinel");
            return partial
                .with_message(Message::system(CONTEXT_UNAVAILABLE))
                .degraded();
        };

        match call_with_timeout(COLLABORATOR, self.timeout, self.lookup.lookup(subject_id)).await {
            Ok(record) => {
                debug!(run_id = %state.run_id(), subject_id, "Subject record retrieved");
                partial.with_message(Message::system(format!(
                    "Subject data ({}): {}",
                    record.name, record.history
                )))
            }
            Err(error) => {
                warn!(
                    run_id = %state.run_id(),
                    subject_id,
                    error = %error,
                    "Record lookup failed; using sentinel"
                );
                partial
                    .with_message(Message::system(CONTEXT_UNAVAILABLE))
                    .degraded()
            }
        }
    }
}
