//! Audit log client.

use super::transport_error;
use crate::errors::CollaboratorError;
use crate::ports::{AuditRecord, AuditSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

const COLLABORATOR: &str = "audit sink";

/// Header carrying [`AuditRecord::idempotency_key`].
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Body posted to the audit endpoint.
#[derive(Debug, Serialize)]
struct AuditPayload<'a> {
    patient_id: &'a str,
    agent_name: &'a str,
    input_symptoms: &'a str,
    ai_analysis: &'a str,
    timestamp: DateTime<Utc>,
}

impl<'a> From<&'a AuditRecord> for AuditPayload<'a> {
    fn from(record: &'a AuditRecord) -> Self {
        Self {
            patient_id: &record.subject_id,
            agent_name: record.stage_name.as_str(),
            input_symptoms: &record.input_text,
            ai_analysis: &record.output_text,
            timestamp: record.timestamp,
        }
    }
}

/// Posts audit records as JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpAuditSink {
    client: Client,
    url: String,
}

impl HttpAuditSink {
    /// Creates a sink posting to `url`.
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn record(&self, record: AuditRecord) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .post(&self.url)
            .header(IDEMPOTENCY_HEADER, record.idempotency_key())
            .json(&AuditPayload::from(&record))
            .send()
            .await
            .map_err(|e| transport_error(COLLABORATOR, &e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CollaboratorError::status(COLLABORATOR, status.as_u16()))
        }
    }
}
