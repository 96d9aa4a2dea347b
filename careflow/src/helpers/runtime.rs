//! Runtime helpers for bounding collaborator calls.
//!
//! Every external call a stage makes goes through [`call_with_timeout`] so a
//! timeout is reported exactly like any other collaborator failure.

use crate::errors::CollaboratorError;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// Result of a timed operation.
#[derive(Debug)]
pub enum TimedResult<T, E> {
    /// Operation completed successfully.
    Ok(T),
    /// Operation failed with an error.
    Err(E),
    /// Operation timed out.
    Timeout,
}

impl<T, E> TimedResult<T, E> {
    /// Returns true if the operation succeeded.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, TimedResult::Ok(_))
    }

    /// Returns true if the operation timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimedResult::Timeout)
    }

    /// Converts to a standard Result, treating timeout as an error.
    ///
    /// # Errors
    ///
    /// Returns the inner error, or `timeout_error` on timeout.
    pub fn into_result(self, timeout_error: E) -> Result<T, E> {
        match self {
            TimedResult::Ok(v) => Ok(v),
            TimedResult::Err(e) => Err(e),
            TimedResult::Timeout => Err(timeout_error),
        }
    }
}

/// Runs a future with a timeout.
pub async fn run_with_timeout<T, E, F>(duration: Duration, future: F) -> TimedResult<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => TimedResult::Ok(value),
        Ok(Err(error)) => TimedResult::Err(error),
        Err(_) => TimedResult::Timeout,
    }
}

/// Runs a collaborator call with a deadline, folding a timeout into
/// [`CollaboratorError::Timeout`].
///
/// # Errors
///
/// Returns the call's own error, or a timeout error naming `collaborator`.
pub async fn call_with_timeout<T, F>(
    collaborator: &str,
    duration: Duration,
    future: F,
) -> Result<T, CollaboratorError>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    let timeout_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
    run_with_timeout(duration, future)
        .await
        .into_result(CollaboratorError::timeout(collaborator, timeout_ms))
}
