//! Collaborator ports injected into the stages.
//!
//! Each port is a narrow async trait so stages only depend on the
//! capability they use. Concrete adapters live in [`crate::http`] and test
//! doubles in [`crate::testing`].

use crate::core::StageName;
use crate::errors::CollaboratorError;
use crate::state::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Ordered text fragments from a streaming generation call.
pub type FragmentStream = BoxStream<'static, Result<String, CollaboratorError>>;

/// Background record of a subject as returned by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    /// Display name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Background history summary.
    #[serde(default = "default_history", alias = "clinical_history")]
    pub history: String,
}

fn default_name() -> String {
    "unknown subject".to_string()
}

fn default_history() -> String {
    "no prior history".to_string()
}

impl SubjectRecord {
    /// Creates a new subject record.
    #[must_use]
    pub fn new(name: impl Into<String>, history: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history: history.into(),
        }
    }
}

/// A request to the text generator: a system instruction plus the
/// conversation it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Instruction injected ahead of the conversation.
    pub system_instruction: String,
    /// Ordered conversation, oldest first.
    pub messages: Vec<Message>,
}

impl GenerationRequest {
    /// Creates a new generation request.
    #[must_use]
    pub fn new(system_instruction: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            messages,
        }
    }

    /// Returns the full prompt: the system instruction followed by the messages.
    #[must_use]
    pub fn prompt(&self) -> Vec<Message> {
        std::iter::once(Message::system(self.system_instruction.clone()))
            .chain(self.messages.iter().cloned())
            .collect()
    }
}

/// Immutable record of a reviewed interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Run that produced the record.
    pub run_id: Uuid,
    /// Whose record was consulted.
    pub subject_id: String,
    /// Stage that emitted the record.
    pub stage_name: StageName,
    /// The caller's original input.
    pub input_text: String,
    /// The reviewed output.
    pub output_text: String,
    /// When the record was assembled.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Key that identifies the record across redeliveries.
    ///
    /// Delivery is at-least-once; sinks that need exactly-once semantics can
    /// deduplicate on this key.
    #[must_use]
    pub fn idempotency_key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.run_id.as_bytes());
        hasher.update(self.stage_name.as_str().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Looks up a subject's background record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordLookup: Send + Sync {
    /// Fetches the record for `subject_id`.
    ///
    /// Any non-success answer is reported as an error; the caller decides
    /// how to degrade.
    async fn lookup(&self, subject_id: &str) -> Result<SubjectRecord, CollaboratorError>;
}

/// Generates text from a conversation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates the full response as one block.
    async fn complete(&self, request: GenerationRequest) -> Result<String, CollaboratorError>;

    /// Generates the response as ordered fragments whose concatenation
    /// equals the block form.
    ///
    /// The default implementation yields the completed block as a single
    /// fragment.
    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, CollaboratorError> {
        let text = self.complete(request).await?;
        Ok(Box::pin(stream::once(async move { Ok(text) })))
    }
}

/// Write-only persistence for audit records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one record.
    async fn record(&self, record: AuditRecord) -> Result<(), CollaboratorError>;
}
