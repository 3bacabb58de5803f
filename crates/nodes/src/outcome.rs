//! Terminal reports: the per-step [`StepResult`] composites pass around
//! internally, and the public [`Outcome`] a runner hands back to the caller.

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::error::WorkflowError;

/// A snapshot of a [`WorkflowError`] suitable for the trace and for
/// `Outcome.errors`. Decoupled from `WorkflowError` itself so that it can
/// additionally carry the node that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorSummary {
    pub node_name: String,
    pub kind: String,
    pub message: String,
    pub fields: Option<serde_json::Value>,
}

impl ErrorSummary {
    pub fn new(node_name: &str, error: &WorkflowError) -> Self {
        Self {
            node_name: node_name.to_string(),
            kind: error.kind.clone(),
            message: error.message.clone(),
            fields: error.fields.clone(),
        }
    }
}

/// The result of a single leaf or sequence step. Internal to the tree walk —
/// never exposed directly to the caller, who only ever sees an [`Outcome`].
#[derive(Debug, Clone)]
pub enum StepResult {
    Success,
    Failed(ErrorSummary),
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success)
    }
}

/// Terminal status of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
    /// Produced only by the `continue` `FailureStrategy` when at least one
    /// step failed but the run was carried through to the end.
    Partial,
}

/// The immutable terminal report of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub status: OutcomeStatus,
    pub errors: Vec<ErrorSummary>,
    pub duration_ms: u64,
    pub context: ExecutionContext<T>,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
