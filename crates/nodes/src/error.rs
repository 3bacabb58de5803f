//! Error types used by the execution contract.
//!
//! `WorkflowError` is the only error a leaf or compensator can produce; it
//! carries a semantic `kind` tag (not a Rust type) so that `RetryPolicy` can
//! classify it without knowing about any particular failure mode in advance.
//! `ContractError` is the other half of the split described in SPEC_FULL.md
//! §7: it is never placed in `Outcome.errors` and is always returned
//! directly from the API that detected the violation.

use thiserror::Error;

/// An error produced by user code inside a leaf or a compensator.
///
/// `kind` is a caller-chosen tag (e.g. `"network_error"`) used by
/// [`crate::retry::RetryPolicy`]'s `retry_on`/`give_up_on` sets. A handful of
/// kinds are reserved by the engine itself: `"runner_mismatch"` and
/// `"cancelled"` (see [`WorkflowError::runner_mismatch`] and
/// [`WorkflowError::cancelled`]).
#[derive(Debug, Error, Clone)]
#[error("{kind}: {message}")]
pub struct WorkflowError {
    pub kind: String,
    pub message: String,
    pub fields: Option<serde_json::Value>,
}

impl WorkflowError {
    /// A plain user-raised error with an arbitrary kind tag.
    pub fn user(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            fields: None,
        }
    }

    /// Attach structured fields to an existing error.
    #[must_use]
    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = Some(fields);
        self
    }

    /// The sync runner encountered async work it cannot drive.
    pub fn runner_mismatch(message: impl Into<String>) -> Self {
        Self {
            kind: "runner_mismatch".to_string(),
            message: message.into(),
            fields: None,
        }
    }

    /// Cooperative cancellation was delivered to an async run.
    pub fn cancelled() -> Self {
        Self {
            kind: "cancelled".to_string(),
            message: "run was cancelled".to_string(),
            fields: None,
        }
    }

    pub fn is_runner_mismatch(&self) -> bool {
        self.kind == "runner_mismatch"
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == "cancelled"
    }
}

/// A programming error in the shape of the executable tree or in the use of
/// the runner. Always raised (returned directly, never folded into an
/// [`crate::outcome::Outcome`]).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// Two children of the same composite share a name.
    #[error("duplicate child name '{0}' within the same composite")]
    DuplicateName(String),

    /// A run was attempted against a context that is already running
    /// (including re-entrance from inside a compensator).
    #[error("context is already active in another run")]
    Reentrant,
}

/// Failure to (de)serialize an [`crate::context::ExecutionContext`].
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("malformed context JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}
