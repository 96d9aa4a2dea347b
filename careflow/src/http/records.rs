//! Record store client.

use super::transport_error;
use crate::errors::{CareflowError, CollaboratorError, Result};
use crate::ports::{RecordLookup, SubjectRecord};
use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

const COLLABORATOR: &str = "record lookup";

/// Looks up subject records with `GET {base_url}/{subject_id}/`.
#[derive(Debug, Clone)]
pub struct HttpRecordLookup {
    client: Client,
    base_url: Url,
}

impl HttpRecordLookup {
    /// Creates a lookup against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`CareflowError::Config`] if `base_url` is not an absolute URL.
    pub fn new(client: Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CareflowError::config(format!("invalid records url '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(CareflowError::config(format!(
                "records url '{base_url}' cannot take path segments"
            )));
        }
        Ok(Self { client, base_url })
    }

    /// Returns the record URL for `subject_id`; the id is percent-encoded.
    pub fn record_url(&self, subject_id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(subject_id).push("");
        }
        url
    }
}

#[async_trait]
impl RecordLookup for HttpRecordLookup {
    async fn lookup(&self, subject_id: &str) -> Result<SubjectRecord, CollaboratorError> {
        let url = self.record_url(subject_id);
        debug!(%url, "Fetching subject record");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| transport_error(COLLABORATOR, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::status(COLLABORATOR, status.as_u16()));
        }

        response
            .json::<SubjectRecord>()
            .await
            .map_err(|e| CollaboratorError::invalid_response(COLLABORATOR, e.to_string()))
    }
}
