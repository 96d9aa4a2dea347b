//! Background delivery of audit records.
//!
//! The safety reviewer hands each reviewed interaction to an
//! [`AuditDispatcher`], which writes it on a spawned task bounded by the
//! audit timeout. Failures are logged and never reach the run. Delivery is
//! at-least-once; [`AuditRecord::idempotency_key`] lets a sink deduplicate.

use crate::helpers::call_with_timeout;
use crate::ports::{AuditRecord, AuditSink};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const COLLABORATOR: &str = "audit sink";

/// Spawns and tracks audit writes.
///
/// Cloning is cheap; clones share the sink and the set of outstanding writes.
#[derive(Clone)]
pub struct AuditDispatcher {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl fmt::Debug for AuditDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditDispatcher")
            .field("timeout", &self.timeout)
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl AuditDispatcher {
    /// Creates a dispatcher writing to `sink`, each write bounded by `timeout`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self {
            sink,
            timeout,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Schedules a write. Returns immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self, record: AuditRecord) {
        let sink = Arc::clone(&self.sink);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let run_id = record.run_id;
            let key = record.idempotency_key();
            match call_with_timeout(COLLABORATOR, timeout, sink.record(record)).await {
                Ok(()) => debug!(%run_id, idempotency_key = %key, "Audit record written"),
                Err(error) => warn!(
                    %run_id,
                    idempotency_key = %key,
                    error = %error,
                    "Audit write failed; continuing"
                ),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Returns the number of writes that have not finished yet.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.lock().iter().filter(|h| !h.is_finished()).count()
    }

    /// Waits for every outstanding write to finish.
    pub async fn flush(&self) {
        let handles: Vec<_> = std::mem::take(&mut *self.pending.lock());

        for handle in handles {
            if let Err(error) = handle.await {
                warn!(error = %error, "Audit task did not complete");
            }
        }
    }
}
