//! Integration tests for pipeline execution.

#[cfg(test)]
mod tests {
    use crate::config::DEFAULT_DISCLAIMER;
    use crate::core::{PipelineEvent, RunPhase, StageName};
    use crate::errors::{CareflowError, CollaboratorError, InvariantViolation};
    use crate::events::{event_types, CollectingEventSink};
    use crate::pipeline::{Checkpoint, PipelineBuilder};
    use crate::ports::{GenerationRequest, SubjectRecord, TextGenerator};
    use crate::stages::{FragmentSink, Stage, CONTEXT_UNAVAILABLE};
    use crate::state::{ConversationState, Message, PartialState, Role, DEFAULT_FOCUS};
    use crate::testing::{
        jane_doe_lookup, scenario_generator, scenario_state, test_config, FailingRecordLookup,
        RecordingAuditSink, ScriptedGenerator, StaticRecordLookup, TestPipeline,
        SCENARIO_ANALYSIS,
    };
    use async_trait::async_trait;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    #[derive(Debug)]
    struct RogueRetriever;

    #[async_trait]
    impl Stage for RogueRetriever {
        fn name(&self) -> StageName {
            StageName::Retriever
        }

        async fn apply(&self, _state: &ConversationState, _sink: Option<&FragmentSink>) -> PartialState {
            PartialState::new(StageName::Retriever).with_message(Message::assistant("diagnosis"))
        }
    }

    #[derive(Debug)]
    struct ReplayingAnalyst;

    #[async_trait]
    impl Stage for ReplayingAnalyst {
        fn name(&self) -> StageName {
            StageName::Analyst
        }

        async fn apply(&self, _state: &ConversationState, _sink: Option<&FragmentSink>) -> PartialState {
            PartialState::new(StageName::Retriever).with_message(Message::system("again"))
        }
    }

    struct EchoGenerator;

    #[async_trait]
    impl TextGenerator for EchoGenerator {
        async fn complete(&self, request: GenerationRequest) -> Result<String, CollaboratorError> {
            let last = request.messages.last().map_or("", |m| m.content.as_str());
            Ok(format!("echo: {last}"))
        }
    }

    fn fragments_of(events: &[PipelineEvent], stage: StageName) -> String {
        events
            .iter()
            .filter(|e| e.stage() == Some(stage))
            .filter_map(PipelineEvent::fragment_text)
            .collect()
    }

    async fn collect_ok(pipeline: &TestPipeline, state: ConversationState) -> Vec<PipelineEvent> {
        pipeline
            .runner
            .stream(state)
            .map(|event| event.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let pipeline = TestPipeline::scenario();

        let state = pipeline.runner.run_to_completion(scenario_state()).await.unwrap();
        pipeline.runner.audit().flush().await;

        let roles: Vec<Role> = state.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::System, Role::Assistant, Role::Assistant]
        );
        assert_eq!(
            state.messages()[1].content,
            "Subject data (Jane Doe): hypertension"
        );
        assert_eq!(state.messages()[2].content, SCENARIO_ANALYSIS);
        assert!(state.safety_cleared());
        assert_eq!(state.phase(), RunPhase::Reviewed);

        let records = pipeline.audit.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].stage_name.as_str(), "safety_reviewer");
        assert_eq!(records[0].subject_id, "PAC-001");
        assert_eq!(records[0].input_text, "severe chest pain");
        assert_eq!(records[0].output_text, state.messages()[3].content);
    }

    #[tokio::test]
    async fn test_completion_adds_three_messages_and_clears_safety() {
        let pipeline = TestPipeline::scenario();
        let state = pipeline.runner.run_to_completion(scenario_state()).await.unwrap();

        assert!(state.messages().len() >= 4);
        assert!(state.safety_cleared());
        assert!(state
            .last_message()
            .unwrap()
            .content
            .contains(DEFAULT_DISCLAIMER));
    }

    #[tokio::test]
    async fn test_lookup_failure_degrades_to_sentinel() {
        let pipeline = TestPipeline::new(
            Arc::new(FailingRecordLookup::unreachable()),
            scenario_generator(),
        );

        let state = pipeline.runner.run_to_completion(scenario_state()).await.unwrap();

        let system: Vec<&Message> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .collect();
        assert_eq!(system, vec![&Message::system(CONTEXT_UNAVAILABLE)]);
        assert_eq!(state.phase(), RunPhase::Reviewed);
    }

    #[tokio::test]
    async fn test_lookup_timeout_degrades_to_sentinel() {
        let slow = jane_doe_lookup().with_delay(Duration::from_secs(5));
        let pipeline = TestPipeline::new(Arc::new(slow), scenario_generator());

        let state = pipeline.runner.run_to_completion(scenario_state()).await.unwrap();

        assert_eq!(state.messages()[1], Message::system(CONTEXT_UNAVAILABLE));
        assert_eq!(state.phase(), RunPhase::Reviewed);
        assert!(state.safety_cleared());
    }

    #[tokio::test]
    async fn test_unknown_subject_degrades_to_sentinel() {
        let pipeline = TestPipeline::new(Arc::new(StaticRecordLookup::new()), scenario_generator());
        let state = pipeline.runner.run_to_completion(scenario_state()).await.unwrap();

        assert_eq!(state.messages()[1].content, CONTEXT_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_checkpoint_and_resume_matches_full_run() {
        let run_id = Uuid::new_v4();

        let full = TestPipeline::scenario()
            .runner
            .run_to_completion(scenario_state().with_run_id(run_id).unwrap())
            .await
            .unwrap();

        let pipeline = TestPipeline::scenario();
        let checkpoint = pipeline
            .runner
            .run_with_checkpoint(scenario_state().with_run_id(run_id).unwrap())
            .await
            .unwrap();
        assert_eq!(checkpoint.state().phase(), RunPhase::Analyzed);
        assert!(!checkpoint.state().safety_cleared());
        assert!(pipeline.audit.is_empty());

        let resumed = pipeline.runner.resume(checkpoint).await.unwrap();
        assert_eq!(resumed, full);
    }

    #[tokio::test]
    async fn test_resume_from_serialized_checkpoint() {
        let pipeline = TestPipeline::scenario();
        let checkpoint = pipeline
            .runner
            .run_with_checkpoint(scenario_state())
            .await
            .unwrap();
        let json = checkpoint.to_json().unwrap();

        let restored = Checkpoint::from_json(&json).unwrap();
        let state = pipeline.runner.resume(restored).await.unwrap();
        pipeline.runner.audit().flush().await;

        assert_eq!(state.phase(), RunPhase::Reviewed);
        assert_eq!(pipeline.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_from_wrong_phase_is_rejected() {
        let pipeline = TestPipeline::scenario();
        let checkpoint = pipeline
            .runner
            .run_with_checkpoint(scenario_state())
            .await
            .unwrap();
        let json = checkpoint.to_json().unwrap().replace("\"analyzed\"", "\"reviewed\"");

        let err = pipeline
            .runner
            .resume(Checkpoint::from_json(&json).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::InvalidResume {
                expected: RunPhase::Analyzed,
                actual: RunPhase::Reviewed,
            })
        ));
        assert!(err.is_internal());
    }

    #[tokio::test]
    async fn test_stream_fragments_match_merged_messages() {
        let pipeline = TestPipeline::scenario();
        let events = collect_ok(&pipeline, scenario_state()).await;

        assert_eq!(fragments_of(&events, StageName::Retriever), "");
        assert_eq!(fragments_of(&events, StageName::Analyst), SCENARIO_ANALYSIS);

        let Some(PipelineEvent::RunCompleted { analysis_text, stages_touched }) = events.last()
        else {
            panic!("stream must end with RunCompleted");
        };
        assert_eq!(&fragments_of(&events, StageName::SafetyReviewer), analysis_text);
        assert_eq!(stages_touched, &StageName::SEQUENCE.to_vec());
    }

    #[tokio::test]
    async fn test_stream_event_order() {
        let pipeline = TestPipeline::scenario();
        let events = collect_ok(&pipeline, scenario_state()).await;

        let markers: Vec<&PipelineEvent> = events
            .iter()
            .filter(|e| e.fragment_text().is_none())
            .collect();
        assert_eq!(markers.len(), 4);
        let completed: Vec<PipelineEvent> = markers[..3].iter().map(|e| (*e).clone()).collect();
        assert_eq!(
            completed,
            StageName::SEQUENCE
                .iter()
                .map(|&stage| PipelineEvent::StageCompleted { stage })
                .collect::<Vec<_>>()
        );
        assert!(markers[3].is_terminal());

        let analyst_done = events
            .iter()
            .position(|e| *e == PipelineEvent::StageCompleted { stage: StageName::Analyst })
            .unwrap();
        assert!(events[..analyst_done]
            .iter()
            .all(|e| e.stage() != Some(StageName::SafetyReviewer)));
    }

    #[tokio::test]
    async fn test_stream_and_completion_agree() {
        let run_id = Uuid::new_v4();
        let full = TestPipeline::scenario()
            .runner
            .run_to_completion(scenario_state().with_run_id(run_id).unwrap())
            .await
            .unwrap();

        let events = collect_ok(
            &TestPipeline::scenario(),
            scenario_state().with_run_id(run_id).unwrap(),
        )
        .await;

        assert_eq!(
            fragments_of(&events, StageName::Analyst),
            full.messages()[2].content
        );
        assert_eq!(
            fragments_of(&events, StageName::SafetyReviewer),
            full.messages()[3].content
        );
    }

    #[tokio::test]
    async fn test_broken_stream_still_concatenates_to_message() {
        let generator = ScriptedGenerator::new()
            .with_failure_after(
                ["Chest pain "],
                CollaboratorError::invalid_response("text generator", "reset"),
            )
            .with_reply(format!("Reviewed. {DEFAULT_DISCLAIMER}"));
        let pipeline = TestPipeline::new(Arc::new(jane_doe_lookup()), generator);

        let events = collect_ok(&pipeline, scenario_state()).await;

        assert_eq!(
            fragments_of(&events, StageName::Analyst),
            "Chest pain \n\nanalysis unavailable"
        );
        assert!(events.last().unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_dropping_stream_before_review_skips_audit() {
        let pipeline = TestPipeline::scenario();
        let mut stream = pipeline.runner.stream(scenario_state());

        while let Some(event) = stream.next().await {
            if event.unwrap() == (PipelineEvent::StageCompleted { stage: StageName::Analyst }) {
                break;
            }
        }
        drop(stream);
        pipeline.runner.audit().flush().await;

        assert!(pipeline.audit.is_empty());
        assert_eq!(pipeline.generator.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_streamed_run_writes_audit_once() {
        let pipeline = TestPipeline::scenario();
        let _ = collect_ok(&pipeline, scenario_state()).await;
        pipeline.runner.audit().flush().await;

        assert_eq!(pipeline.audit.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_stream() {
        let pipeline = TestPipeline::scenario();
        let checkpoint = pipeline
            .runner
            .run_with_checkpoint(scenario_state())
            .await
            .unwrap();

        let events: Vec<_> = pipeline
            .runner
            .resume_stream(checkpoint)
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert!(events
            .iter()
            .all(|e| e.stage().map_or(true, |s| s == StageName::SafetyReviewer)));
        let Some(PipelineEvent::RunCompleted { stages_touched, .. }) = events.last() else {
            panic!("stream must end with RunCompleted");
        };
        assert_eq!(stages_touched, &StageName::SEQUENCE.to_vec());
    }

    #[tokio::test]
    async fn test_ownership_violation_aborts_run() {
        let runner = PipelineBuilder::new()
            .with_config(test_config())
            .with_record_lookup(Arc::new(jane_doe_lookup()))
            .with_generator(Arc::new(scenario_generator()))
            .with_audit_sink(Arc::new(RecordingAuditSink::new()))
            .with_stage(Arc::new(RogueRetriever))
            .build()
            .unwrap();

        let err = runner.run_to_completion(scenario_state()).await.unwrap_err();
        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::Ownership { stage: StageName::Retriever, .. })
        ));

        let events: Vec<_> = runner.stream(scenario_state()).collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_replayed_partial_is_rejected() {
        let runner = PipelineBuilder::new()
            .with_config(test_config())
            .with_record_lookup(Arc::new(jane_doe_lookup()))
            .with_generator(Arc::new(scenario_generator()))
            .with_audit_sink(Arc::new(RecordingAuditSink::new()))
            .with_stage(Arc::new(ReplayingAnalyst))
            .build()
            .unwrap();

        let err = runner.run_to_completion(scenario_state()).await.unwrap_err();
        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::DuplicateMerge {
                stage: StageName::Retriever
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_initial_state_runs_nothing() {
        let pipeline = TestPipeline::scenario();

        let err = pipeline
            .runner
            .run_to_completion(ConversationState::new("PAC-001", "   ", DEFAULT_FOCUS))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = pipeline
            .runner
            .run_to_completion(ConversationState::new("", "pain", DEFAULT_FOCUS))
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(pipeline.generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_started_state_is_rejected() {
        let pipeline = TestPipeline::scenario();
        let started = scenario_state()
            .merged(PartialState::new(StageName::Retriever).with_message(Message::system("ctx")))
            .unwrap();

        let err = pipeline.runner.run_to_completion(started).await.unwrap_err();
        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::MalformedState(_))
        ));
    }

    #[tokio::test]
    async fn test_deserialized_state_marked_cleared_is_rejected() {
        let pipeline = TestPipeline::scenario();
        let mut json = serde_json::to_value(scenario_state()).unwrap();
        json["safety_cleared"] = serde_json::Value::Bool(true);
        let forged: ConversationState = serde_json::from_value(json).unwrap();

        let err = pipeline.runner.run_with_checkpoint(forged).await.unwrap_err();

        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::MalformedState(_))
        ));
        assert!(pipeline.generator.requests().is_empty());
    }

    #[tokio::test]
    async fn test_deserialized_state_with_extra_messages_is_rejected() {
        let pipeline = TestPipeline::scenario();
        let mut json = serde_json::to_value(scenario_state()).unwrap();
        json["messages"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"role": "assistant", "content": "pre-written"}));
        let forged: ConversationState = serde_json::from_value(json).unwrap();

        let err = pipeline.runner.run_to_completion(forged).await.unwrap_err();

        assert!(matches!(
            err,
            CareflowError::Invariant(InvariantViolation::MalformedState(_))
        ));
    }

    #[tokio::test]
    async fn test_parked_run_subject_context_is_read_only() {
        let pipeline = TestPipeline::scenario();
        let checkpoint = pipeline
            .runner
            .run_with_checkpoint(scenario_state())
            .await
            .unwrap();

        let err = checkpoint
            .state()
            .clone()
            .with_context("subject_id", "PAC-999")
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::MalformedState(_)));

        let state = pipeline.runner.resume(checkpoint).await.unwrap();
        pipeline.runner.audit().flush().await;

        assert_eq!(state.subject_id(), Some("PAC-001"));
        assert_eq!(pipeline.audit.records()[0].subject_id, "PAC-001");
    }

    #[tokio::test]
    async fn test_audit_failure_does_not_affect_run() {
        let audit = Arc::new(RecordingAuditSink::failing());
        let runner = PipelineBuilder::new()
            .with_config(test_config())
            .with_record_lookup(Arc::new(jane_doe_lookup()))
            .with_generator(Arc::new(scenario_generator()))
            .with_audit_sink(audit.clone())
            .build()
            .unwrap();

        let state = runner.run_to_completion(scenario_state()).await.unwrap();
        runner.audit().flush().await;

        assert!(state.safety_cleared());
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let events = Arc::new(CollectingEventSink::new());
        let runner = PipelineBuilder::new()
            .with_config(test_config())
            .with_record_lookup(Arc::new(jane_doe_lookup()))
            .with_generator(Arc::new(scenario_generator()))
            .with_audit_sink(Arc::new(RecordingAuditSink::new()))
            .with_event_sink(events.clone())
            .build()
            .unwrap();

        runner.run_to_completion(scenario_state()).await.unwrap();

        let types = events.event_types();
        assert_eq!(types.first().map(String::as_str), Some(event_types::PIPELINE_STARTED));
        assert_eq!(types.last().map(String::as_str), Some(event_types::PIPELINE_COMPLETED));
        assert_eq!(events.events_of_type("stage.completed").len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_independent() {
        let runner = PipelineBuilder::new()
            .with_config(test_config())
            .with_record_lookup(Arc::new(
                jane_doe_lookup().with_record("PAC-002", SubjectRecord::new("John Roe", "asthma")),
            ))
            .with_generator(Arc::new(EchoGenerator))
            .with_audit_sink(Arc::new(RecordingAuditSink::new()))
            .build()
            .unwrap();

        let (first, second) = tokio::join!(
            runner.run_to_completion(ConversationState::new("PAC-001", "chest pain", DEFAULT_FOCUS)),
            runner.run_to_completion(ConversationState::new("PAC-002", "shortness of breath", DEFAULT_FOCUS)),
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.messages()[1].content, "Subject data (Jane Doe): hypertension");
        assert_eq!(second.messages()[1].content, "Subject data (John Roe): asthma");
        assert_ne!(first.run_id(), second.run_id());
        assert_eq!(first.messages().len(), 4);
        assert_eq!(second.messages().len(), 4);
    }
}
