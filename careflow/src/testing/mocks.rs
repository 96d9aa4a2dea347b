//! In-memory collaborators for testing.

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::CollaboratorError;
use crate::ports::{
    AuditRecord, AuditSink, FragmentStream, GenerationRequest, RecordLookup, SubjectRecord,
    TextGenerator,
};

/// A record lookup backed by a map. Unknown subjects answer with status 404.
#[derive(Debug, Default)]
pub struct StaticRecordLookup {
    records: HashMap<String, SubjectRecord>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticRecordLookup {
    /// Creates an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record.
    #[must_use]
    pub fn with_record(mut self, subject_id: impl Into<String>, record: SubjectRecord) -> Self {
        self.records.insert(subject_id.into(), record);
        self
    }

    /// Delays every answer.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Returns the number of lookups made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordLookup for StaticRecordLookup {
    async fn lookup(&self, subject_id: &str) -> Result<SubjectRecord, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.records
            .get(subject_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::status("record lookup", 404))
    }
}

/// A record lookup that always fails with the same error.
#[derive(Debug, Clone)]
pub struct FailingRecordLookup {
    error: CollaboratorError,
}

impl FailingRecordLookup {
    /// Creates a lookup failing with `error`.
    #[must_use]
    pub fn new(error: CollaboratorError) -> Self {
        Self { error }
    }

    /// Creates a lookup whose store is unreachable.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::new(CollaboratorError::unavailable("record lookup", "connection refused"))
    }
}

#[async_trait]
impl RecordLookup for FailingRecordLookup {
    async fn lookup(&self, _subject_id: &str) -> Result<SubjectRecord, CollaboratorError> {
        Err(self.error.clone())
    }
}

/// One scripted answer of a [`ScriptedGenerator`].
#[derive(Debug, Clone)]
enum Script {
    Reply(Vec<String>),
    FailAfter(Vec<String>, CollaboratorError),
    Stall,
}

/// A text generator answering each call with the next scripted reply.
///
/// Replies are consumed in order, one per call, whether the call is
/// `complete` or `stream`. An exhausted script answers with an error.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    /// Creates a generator with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a reply delivered as one fragment.
    #[must_use]
    pub fn with_reply(self, text: impl Into<String>) -> Self {
        self.push(Script::Reply(vec![text.into()]))
    }

    /// Queues a reply delivered as the given fragments.
    #[must_use]
    pub fn with_fragments<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Script::Reply(fragments.into_iter().map(Into::into).collect()))
    }

    /// Queues a failure before any fragment.
    #[must_use]
    pub fn with_failure(self, error: CollaboratorError) -> Self {
        self.push(Script::FailAfter(Vec::new(), error))
    }

    /// Queues a stream that breaks after the given fragments. In block mode
    /// the call simply fails.
    #[must_use]
    pub fn with_failure_after<I, S>(self, fragments: I, error: CollaboratorError) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(Script::FailAfter(
            fragments.into_iter().map(Into::into).collect(),
            error,
        ))
    }

    /// Queues a call that never answers.
    #[must_use]
    pub fn with_stall(self) -> Self {
        self.push(Script::Stall)
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    fn push(self, script: Script) -> Self {
        self.script.lock().push_back(script);
        self
    }

    fn next(&self, request: GenerationRequest) -> Script {
        self.requests.lock().push(request);
        self.script.lock().pop_front().unwrap_or_else(|| {
            Script::FailAfter(
                Vec::new(),
                CollaboratorError::invalid_response("text generator", "script exhausted"),
            )
        })
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: GenerationRequest) -> Result<String, CollaboratorError> {
        match self.next(request) {
            Script::Reply(fragments) => Ok(fragments.concat()),
            Script::FailAfter(_, error) => Err(error),
            Script::Stall => std::future::pending().await,
        }
    }

    async fn stream(&self, request: GenerationRequest) -> Result<FragmentStream, CollaboratorError> {
        match self.next(request) {
            Script::Reply(fragments) => Ok(Box::pin(stream::iter(fragments.into_iter().map(Ok)))),
            Script::FailAfter(fragments, error) if fragments.is_empty() => Err(error),
            Script::FailAfter(fragments, error) => Ok(Box::pin(stream::iter(
                fragments
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(error))),
            ))),
            Script::Stall => Ok(Box::pin(stream::pending())),
        }
    }
}

/// An audit sink that keeps every record in memory.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
    failure: Option<CollaboratorError>,
}

impl RecordingAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that rejects every write (and records nothing).
    #[must_use]
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            failure: Some(CollaboratorError::status("audit sink", 503)),
        }
    }

    /// Returns all stored records.
    #[must_use]
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), CollaboratorError> {
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.records.lock().push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_static_lookup() {
        let lookup =
            StaticRecordLookup::new().with_record("A", SubjectRecord::new("Ann", "asthma"));

        assert_eq!(lookup.lookup("A").await.unwrap().name, "Ann");
        assert_eq!(
            lookup.lookup("B").await.unwrap_err(),
            CollaboratorError::status("record lookup", 404)
        );
        assert_eq!(lookup.call_count(), 2);
    }

    #[tokio::test]
    async fn test_scripted_generator_consumes_in_order() {
        let generator = ScriptedGenerator::new()
            .with_reply("first")
            .with_fragments(["sec", "ond"]);

        let first = generator
            .complete(GenerationRequest::new("a", Vec::new()))
            .await
            .unwrap();
        let second: Vec<_> = generator
            .stream(GenerationRequest::new("b", Vec::new()))
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(first, "first");
        assert_eq!(second, vec![Ok("sec".to_string()), Ok("ond".to_string())]);
        assert_eq!(generator.requests().len(), 2);
        assert!(generator
            .complete(GenerationRequest::new("c", Vec::new()))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_failing_audit_sink_stores_nothing() {
        let sink = RecordingAuditSink::failing();
        let record = AuditRecord {
            run_id: uuid::Uuid::new_v4(),
            subject_id: "A".to_string(),
            stage_name: crate::core::StageName::SafetyReviewer,
            input_text: String::new(),
            output_text: String::new(),
            timestamp: chrono::Utc::now(),
        };

        assert!(sink.record(record).await.is_err());
        assert!(sink.is_empty());
    }
}
