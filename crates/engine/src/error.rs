//! Engine-level errors.
//!
//! Contract violations (duplicate child names, re-entrant runs) are
//! `nodes::ContractError`, returned directly from `Sequence::new`/
//! `Orchestrator::new`/`ExecutionContext::begin_run` rather than living
//! here — see SPEC_FULL.md §7. This module only covers the validation
//! failures specific to dynamic assembly.

use thiserror::Error;

/// Failure to validate a dynamic-assembly descriptor (SPEC_FULL.md §4.6).
/// Validated in full before anything is constructed, so a failing assembly
/// never partially builds an `Orchestrator`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    /// A descriptor step name has no matching entry in the registry.
    #[error("unknown_step: '{0}' is not registered")]
    UnknownStep(String),

    /// The descriptor's `strategy` tag isn't one of `abort`/`continue`/`compensate`.
    #[error("invalid_strategy: '{0}'")]
    InvalidStrategy(String),

    /// The registry's leaves produced a malformed tree (e.g. the same step
    /// name assembled twice) — still a programming error, just discovered
    /// during assembly rather than at `Sequence`/`Orchestrator` construction.
    #[error(transparent)]
    Contract(#[from] nodes::ContractError),
}
