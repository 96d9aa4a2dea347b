//! HTTP adapters for the collaborator ports.
//!
//! This module provides:
//! - [`HttpRecordLookup`] against a REST record store
//! - [`HttpAuditSink`] posting audit records as JSON
//! - [`ChatCompletionsGenerator`] for OpenAI-compatible APIs, block and streamed
//! - [`runner_from_config`] to wire all three into a [`PipelineRunner`]

mod audit;
mod chat;
mod records;
mod sse;

pub use audit::{HttpAuditSink, IDEMPOTENCY_HEADER};
pub use chat::ChatCompletionsGenerator;
pub use records::HttpRecordLookup;
pub use sse::{parse_line, SseData, SseLineBuffer};

use crate::config::PipelineConfig;
use crate::errors::{CollaboratorError, Result};
use crate::events::EventSink;
use crate::pipeline::{PipelineBuilder, PipelineRunner};
use reqwest::Client;
use std::sync::Arc;

/// Maps a transport failure onto the collaborator taxonomy.
pub(crate) fn transport_error(collaborator: &str, err: &reqwest::Error) -> CollaboratorError {
    if err.is_decode() {
        CollaboratorError::invalid_response(collaborator, err.to_string())
    } else {
        CollaboratorError::unavailable(collaborator, err.to_string())
    }
}

/// Builds a runner whose collaborators are the HTTP adapters described by
/// `config.http`.
///
/// # Errors
///
/// Returns a configuration error if the config is invalid or a URL cannot
/// be parsed.
pub fn runner_from_config(
    config: PipelineConfig,
    events: Arc<dyn EventSink>,
) -> Result<PipelineRunner> {
    let client = Client::new();
    let lookup = HttpRecordLookup::new(client.clone(), &config.http.records_base_url)?;
    let audit = HttpAuditSink::new(client.clone(), config.http.audit_url.clone());
    let generator = ChatCompletionsGenerator::from_config(client, &config.http);

    PipelineBuilder::new()
        .with_config(config)
        .with_record_lookup(Arc::new(lookup))
        .with_generator(Arc::new(generator))
        .with_audit_sink(Arc::new(audit))
        .with_event_sink(events)
        .build()
}
