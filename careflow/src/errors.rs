//! Error types for the careflow pipeline.
//!
//! The taxonomy has three tiers that are handled very differently:
//!
//! - [`CollaboratorError`]: an external call failed or timed out. Stages
//!   recover from these locally; they never escape a pipeline run.
//! - [`ValidationError`]: the request was malformed and is rejected before
//!   any stage runs.
//! - [`InvariantViolation`]: a programming defect (ownership breach,
//!   duplicate merge, bad resume). The run is aborted.

use crate::core::{RunPhase, StageName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for careflow operations.
#[derive(Debug, Error)]
pub enum CareflowError {
    /// The request was rejected before the pipeline started.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// An internal invariant was violated; the run was aborted.
    #[error("{0}")]
    Invariant(#[from] InvariantViolation),

    /// A collaborator call failed outside of a stage boundary.
    #[error("{0}")]
    Collaborator(#[from] CollaboratorError),

    /// Configuration or wiring is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CareflowError {
    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns true if the error was caused by the caller's input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the error indicates a defect inside the pipeline.
    #[must_use]
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }

    /// Converts to a dictionary representation suitable for an error response.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let kind = match self {
            Self::Validation(_) => "validation",
            Self::Invariant(_) => "internal",
            Self::Collaborator(_) => "collaborator",
            Self::Config(_) => "config",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        };

        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        if let Self::Validation(err) = self {
            map.insert("field".to_string(), serde_json::json!(err.field));
        }
        map
    }
}

/// Error raised when a pipeline request is malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Invalid request: {field}: {message}")]
pub struct ValidationError {
    /// The offending request field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    /// Creates a new validation error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Fatal internal errors: the pipeline contract was broken by code, not by
/// the environment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A partial for a stage that has already been merged.
    #[error("Duplicate merge: output of stage '{stage}' was already applied")]
    DuplicateMerge {
        /// The stage whose output was replayed.
        stage: StageName,
    },

    /// A partial arrived before its predecessor stages ran.
    #[error("Out-of-order merge: expected output of {expected:?}, got '{actual}'")]
    OutOfOrderMerge {
        /// The next stage the state machine is waiting for.
        expected: Option<StageName>,
        /// The stage that produced the partial.
        actual: StageName,
    },

    /// A stage produced a field it does not own.
    #[error("Ownership violation by stage '{stage}': {message}")]
    Ownership {
        /// The offending stage.
        stage: StageName,
        /// Description of the violation.
        message: String,
    },

    /// A run was resumed from a phase other than the checkpoint phase.
    #[error("Cannot resume from phase '{actual}', expected '{expected}'")]
    InvalidResume {
        /// The phase the checkpoint must be parked at.
        expected: RunPhase,
        /// The phase the supplied state is actually at.
        actual: RunPhase,
    },

    /// The state was structurally unusable for a stage.
    #[error("Malformed state: {0}")]
    MalformedState(String),
}

impl InvariantViolation {
    /// Creates an ownership violation.
    #[must_use]
    pub fn ownership(stage: StageName, message: impl Into<String>) -> Self {
        Self::Ownership {
            stage,
            message: message.into(),
        }
    }
}

/// Failures of external collaborators (record lookup, generation, audit).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// The call did not finish within its deadline.
    #[error("{collaborator} timed out after {timeout_ms}ms")]
    Timeout {
        /// Which collaborator was called.
        collaborator: String,
        /// The deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The collaborator answered with a non-success status.
    #[error("{collaborator} returned status {status}")]
    Status {
        /// Which collaborator was called.
        collaborator: String,
        /// The status code received.
        status: u16,
    },

    /// The collaborator could not be reached.
    #[error("{collaborator} unavailable: {reason}")]
    Unavailable {
        /// Which collaborator was called.
        collaborator: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The collaborator answered with something that could not be decoded.
    #[error("{collaborator} sent an invalid response: {reason}")]
    InvalidResponse {
        /// Which collaborator was called.
        collaborator: String,
        /// Decoding failure.
        reason: String,
    },
}

impl CollaboratorError {
    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(collaborator: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            collaborator: collaborator.into(),
            timeout_ms,
        }
    }

    /// Creates a status error.
    #[must_use]
    pub fn status(collaborator: impl Into<String>, status: u16) -> Self {
        Self::Status {
            collaborator: collaborator.into(),
            status,
        }
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if this is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = CareflowError> = std::result::Result<T, E>;
