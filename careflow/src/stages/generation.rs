//! Shared generation call used by the analyst and the safety reviewer.

use super::FragmentSink;
use crate::core::StageName;
use crate::helpers::call_with_timeout;
use crate::ports::{GenerationRequest, TextGenerator};
use futures::StreamExt;
use std::time::Duration;
use tracing::warn;

const COLLABORATOR: &str = "text generator";

/// Text produced by one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Generated {
    pub text: String,
    pub degraded: bool,
}

/// Runs one generation call, falling back to `sentinel` on failure.
///
/// In streaming mode the deadline covers the whole stream. If the stream
/// breaks after some fragments were forwarded, the sentinel is forwarded as a
/// final fragment so the fragments still add up to the returned text.
pub(super) async fn generate(
    stage: StageName,
    generator: &dyn TextGenerator,
    request: GenerationRequest,
    timeout: Duration,
    sink: Option<&FragmentSink>,
    sentinel: &str,
) -> Generated {
    let Some(sink) = sink else {
        return match call_with_timeout(COLLABORATOR, timeout, generator.complete(request)).await {
            Ok(text) => Generated {
                text,
                degraded: false,
            },
            Err(error) => {
                warn!(%stage, error = %error, "Generation failed; using sentinel");
                Generated {
                    text: sentinel.to_string(),
                    degraded: true,
                }
            }
        };
    };

    let mut text = String::new();
    let outcome = call_with_timeout(COLLABORATOR, timeout, async {
        let mut fragments = generator.stream(request).await?;
        while let Some(fragment) = fragments.next().await {
            let fragment = fragment?;
            sink.send(&fragment);
            text.push_str(&fragment);
        }
        Ok(())
    })
    .await;

    match outcome {
        Ok(()) => Generated {
            text,
            degraded: false,
        },
        Err(error) => {
            warn!(
                %stage,
                error = %error,
                emitted_chars = text.len(),
                "Generation stream failed; using sentinel"
            );
            let tail = if text.is_empty() {
                sentinel.to_string()
            } else {
                format!("\n\n{sentinel}")
            };
            sink.send(&tail);
            text.push_str(&tail);
            Generated {
                text,
                degraded: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CollaboratorError;
    use crate::stages::FragmentReceiver;
    use crate::testing::ScriptedGenerator;
    use pretty_assertions::assert_eq;

    fn request() -> GenerationRequest {
        GenerationRequest::new("analyse", Vec::new())
    }

    fn drain(rx: &mut FragmentReceiver) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(fragment) = rx.try_recv() {
            out.push(fragment);
        }
        out
    }

    #[tokio::test]
    async fn test_completion_mode() {
        let generator = ScriptedGenerator::new().with_reply("full answer");
        let generated = generate(
            StageName::Analyst,
            &generator,
            request(),
            Duration::from_secs(1),
            None,
            "analysis unavailable",
        )
        .await;

        assert_eq!(generated.text, "full answer");
        assert!(!generated.degraded);
    }

    #[tokio::test]
    async fn test_streaming_forwards_fragments() {
        let generator = ScriptedGenerator::new().with_fragments(["Hel", "lo ", "world"]);
        let (sink, mut rx) = FragmentSink::channel();

        let generated = generate(
            StageName::Analyst,
            &generator,
            request(),
            Duration::from_secs(1),
            Some(&sink),
            "analysis unavailable",
        )
        .await;

        assert_eq!(drain(&mut rx), vec!["Hel", "lo ", "world"]);
        assert_eq!(generated.text, "Hello world");
    }

    #[tokio::test]
    async fn test_completion_failure_uses_sentinel() {
        let generator = ScriptedGenerator::new()
            .with_failure(CollaboratorError::unavailable(COLLABORATOR, "down"));
        let generated = generate(
            StageName::Analyst,
            &generator,
            request(),
            Duration::from_secs(1),
            None,
            "analysis unavailable",
        )
        .await;

        assert_eq!(generated.text, "analysis unavailable");
        assert!(generated.degraded);
    }

    #[tokio::test]
    async fn test_stream_broken_midway_appends_sentinel_fragment() {
        let generator = ScriptedGenerator::new().with_failure_after(
            ["partial "],
            CollaboratorError::invalid_response(COLLABORATOR, "connection reset"),
        );
        let (sink, mut rx) = FragmentSink::channel();

        let generated = generate(
            StageName::Analyst,
            &generator,
            request(),
            Duration::from_secs(1),
            Some(&sink),
            "analysis unavailable",
        )
        .await;

        let fragments = drain(&mut rx);
        assert_eq!(fragments.concat(), generated.text);
        assert_eq!(generated.text, "partial \n\nanalysis unavailable");
        assert!(generated.degraded);
    }

    #[tokio::test]
    async fn test_stalled_stream_times_out() {
        let generator = ScriptedGenerator::new().with_stall();
        let (sink, mut rx) = FragmentSink::channel();

        let generated = generate(
            StageName::SafetyReviewer,
            &generator,
            request(),
            Duration::from_millis(20),
            Some(&sink),
            "review unavailable",
        )
        .await;

        assert_eq!(drain(&mut rx), vec!["review unavailable"]);
        assert!(generated.degraded);
    }
}
