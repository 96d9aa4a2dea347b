//! Lazy event streams over a run.

use super::{Checkpoint, PipelineRunner};
use crate::core::{PipelineEvent, StageName};
use crate::errors::{CareflowError, Result};
use crate::observability::{run_span, stage_span, SpanTimer};
use crate::stages::FragmentSink;
use crate::state::{ConversationState, PartialState};
use async_stream::stream;
use futures::stream::BoxStream;
use tracing::Instrument;

/// Events of one streaming run. Ends with [`PipelineEvent::RunCompleted`]
/// or a single `Err` item.
pub type EventStream = BoxStream<'static, Result<PipelineEvent>>;

enum Step {
    Fragment(String),
    Done(PartialState),
}

impl PipelineRunner {
    /// Streams a full run.
    ///
    /// Nothing executes until the stream is polled. Dropping the stream
    /// abandons any in-flight collaborator call; an audit write is only
    /// dispatched once the reviewer has assembled its full text.
    #[must_use]
    pub fn stream(&self, state: ConversationState) -> EventStream {
        let runner = self.clone();
        let prepared = move || runner.begin_run(&state).map(|()| state);
        self.drive(prepared, StageName::SEQUENCE.to_vec(), "stream")
    }

    /// Streams the safety reviewer over a parked run.
    #[must_use]
    pub fn resume_stream(&self, checkpoint: Checkpoint) -> EventStream {
        let prepared = move || checkpoint.into_state().map_err(CareflowError::from);
        self.drive(prepared, vec![StageName::SafetyReviewer], "resume_stream")
    }

    fn drive<P>(&self, prepare: P, stages: Vec<StageName>, mode: &'static str) -> EventStream
    where
        P: FnOnce() -> Result<ConversationState> + Send + 'static,
    {
        let runner = self.clone();

        Box::pin(stream! {
            let mut state = match prepare() {
                Ok(state) => state,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let run_id = state.run_id();
            let run = run_span(run_id, mode);

            for stage in stages {
                let timer = SpanTimer::start(stage);
                runner.emit_stage_started(run_id, stage);
                let (sink, mut fragments) = FragmentSink::channel();

                let partial = {
                    let mut apply = runner
                        .stage(stage)
                        .apply(&state, Some(&sink))
                        .instrument(run.in_scope(|| stage_span(run_id, stage)));
                    loop {
                        let step = tokio::select! {
                            biased;
                            Some(text) = fragments.recv() => Step::Fragment(text),
                            partial = &mut apply => Step::Done(partial),
                        };
                        match step {
                            Step::Fragment(text) => {
                                yield Ok(PipelineEvent::fragment(stage, text));
                            }
                            Step::Done(partial) => break partial,
                        }
                    }
                };
                while let Ok(text) = fragments.try_recv() {
                    yield Ok(PipelineEvent::fragment(stage, text));
                }

                let degraded = partial.is_degraded();
                if let Err(violation) = state.merge(partial) {
                    let err = CareflowError::from(violation);
                    runner.emit_failed(run_id, stage, &err);
                    yield Err(err);
                    return;
                }
                runner.emit_stage_completed(run_id, &timer, degraded);
                yield Ok(PipelineEvent::StageCompleted { stage });
            }

            runner.emit_completed(&state);
            yield Ok(PipelineEvent::RunCompleted {
                analysis_text: state
                    .last_message()
                    .map(|m| m.content.clone())
                    .unwrap_or_default(),
                stages_touched: state.stages_touched(),
            });
        })
    }
}
