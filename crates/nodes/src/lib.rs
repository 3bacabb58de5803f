//! `nodes` crate — the execution contract, context, retry policy, and the
//! atomic `Leaf` node.
//!
//! `engine` builds `Sequence`/`Orchestrator` on top of the `Executable`
//! contract defined here; this crate has no knowledge of sequencing,
//! failure strategies, or compensation.

pub mod context;
pub mod error;
pub mod executable;
pub mod leaf;
pub mod outcome;
pub mod retry;

pub use context::{Detail, Event, EventKind, ExecutionContext};
pub use error::{ContextError, ContractError, WorkflowError};
pub use executable::Executable;
pub use leaf::{Leaf, LeafBody};
pub use outcome::{ErrorSummary, Outcome, OutcomeStatus, StepResult};
pub use retry::{Backoff, FixedJitterSampler, JitterSampler, RandJitterSampler, RetryDecision, RetryPolicy};
