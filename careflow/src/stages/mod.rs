//! The three pipeline stages.
//!
//! A stage reads the current [`ConversationState`] and returns the
//! [`PartialState`] it owns. Stages never fail: collaborator errors and
//! timeouts are converted into a degraded partial carrying a sentinel text.
//!
//! When a [`FragmentSink`] is supplied the stage streams its generated text
//! through it fragment by fragment; the concatenation of the fragments always
//! equals the content of the message in the returned partial.

mod analyst;
mod generation;
mod retriever;
mod reviewer;

pub use analyst::Analyst;
pub use retriever::Retriever;
pub use reviewer::SafetyReviewer;

use crate::core::StageName;
use crate::state::{ConversationState, PartialState};
use async_trait::async_trait;
use std::fmt::Debug;
use tokio::sync::mpsc;

/// Context message used when the record lookup fails.
pub const CONTEXT_UNAVAILABLE: &str = "context unavailable";

/// Analysis text used when generation fails.
pub const ANALYSIS_UNAVAILABLE: &str = "analysis unavailable";

/// Review text used when generation fails; the disclaimer is still appended.
pub const REVIEW_UNAVAILABLE: &str = "review unavailable";

/// A named transformation step of the pipeline.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the stage's name.
    fn name(&self) -> StageName;

    /// Produces this stage's partial output for `state`.
    ///
    /// With `sink = None` the stage runs in completion mode. With a sink it
    /// forwards every generated fragment, in order, before returning.
    async fn apply(&self, state: &ConversationState, sink: Option<&FragmentSink>) -> PartialState;
}

/// Receiving half of a [`FragmentSink`].
pub type FragmentReceiver = mpsc::UnboundedReceiver<String>;

/// Channel through which a stage surfaces fragments while it runs.
#[derive(Debug, Clone)]
pub struct FragmentSink {
    tx: mpsc::UnboundedSender<String>,
}

impl FragmentSink {
    /// Creates a sink and the receiver that observes it.
    #[must_use]
    pub fn channel() -> (Self, FragmentReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Forwards one fragment. Empty fragments are skipped.
    ///
    /// Returns false once the receiver is gone.
    pub fn send(&self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(fragment.to_string()).is_ok()
    }
}
