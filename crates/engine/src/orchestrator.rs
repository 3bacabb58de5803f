//! `Orchestrator` — a top-level sequence that also owns the `FailureStrategy`
//! and drives compensation (SPEC_FULL.md §4.3). Always the root of the tree:
//! only `Leaf` and `Sequence` implement `Executable` (SPEC_FULL.md §3), so an
//! `Orchestrator` can never be nested inside another composite.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use nodes::{ContractError, ErrorSummary, Executable, ExecutionContext, Outcome, OutcomeStatus, StepResult};

/// How the top-level orchestrator reacts to a failing child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    Abort,
    Continue,
    Compensate,
}

impl FailureStrategy {
    /// Parse the wire tag used by the dynamic-assembly descriptor (SPEC_FULL.md §6).
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "abort" => Some(Self::Abort),
            "continue" => Some(Self::Continue),
            "compensate" => Some(Self::Compensate),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::Continue => "continue",
            Self::Compensate => "compensate",
        }
    }
}

/// A sequence plus a failure strategy. Iterates its own children directly
/// rather than delegating to an inner `Sequence` (whose `execute_*` always
/// short-circuits) so that the `continue` strategy can keep evaluating
/// later children after an earlier one fails.
pub struct Orchestrator<T> {
    name: String,
    description: String,
    strategy: FailureStrategy,
    children: Vec<Arc<dyn Executable<T>>>,
    is_async: bool,
}

impl<T: Send + Sync> Orchestrator<T> {
    /// Build an orchestrator from its top-level children, in execution order.
    ///
    /// # Errors
    /// Returns [`ContractError::DuplicateName`] if two children share a name
    /// — malformed trees are rejected at construction time, never at run
    /// time (SPEC_FULL.md §7).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        strategy: FailureStrategy,
        children: Vec<Arc<dyn Executable<T>>>,
    ) -> Result<Self, ContractError> {
        let mut seen = HashSet::with_capacity(children.len());
        for child in &children {
            if !seen.insert(child.name().to_string()) {
                return Err(ContractError::DuplicateName(child.name().to_string()));
            }
        }
        let is_async = children.iter().any(|c| c.is_async());
        Ok(Self {
            name: name.into(),
            description: description.into(),
            strategy,
            children,
            is_async,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn strategy(&self) -> FailureStrategy {
        self.strategy
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn children(&self) -> &[Arc<dyn Executable<T>>] {
        &self.children
    }

    /// Depth-first, pre-order leaves reachable from this orchestrator's
    /// children — collected fresh at failure-detection time, per the
    /// compensation algorithm's rationale (SPEC_FULL.md §4.3): an error
    /// raised mid-compensation can never hide a still-undone step.
    fn all_leaves(&self) -> Vec<&dyn Executable<T>> {
        let mut out = Vec::new();
        for child in &self.children {
            child.collect_leaves(&mut out);
        }
        out
    }

    fn compensable_completed<'a>(&'a self, ctx: &ExecutionContext<T>) -> Vec<&'a dyn Executable<T>> {
        self.all_leaves()
            .into_iter()
            .filter(|leaf| leaf.is_compensable() && ctx.was_completed(leaf.name()))
            .collect()
    }

    /// Invoke every compensable, completed leaf's compensator in reverse of
    /// collection order (LIFO), under the synchronous runner. Best-effort:
    /// one failing compensator never stops the rest.
    fn compensate_sync(&self, ctx: &mut ExecutionContext<T>) -> Vec<ErrorSummary> {
        let mut errors = Vec::new();
        for leaf in self.compensable_completed(ctx).into_iter().rev() {
            if let StepResult::Failed(summary) = leaf.compensate_sync(ctx) {
                warn!(node = %leaf.name(), "compensator failed");
                errors.push(summary);
            }
        }
        errors
    }

    async fn compensate_async(&self, ctx: &mut ExecutionContext<T>) -> Vec<ErrorSummary> {
        let mut errors = Vec::new();
        for leaf in self.compensable_completed(ctx).into_iter().rev() {
            if let StepResult::Failed(summary) = leaf.compensate_async(ctx).await {
                warn!(node = %leaf.name(), "compensator failed");
                errors.push(summary);
            }
        }
        errors
    }

    fn walk_sync(&self, ctx: &mut ExecutionContext<T>) -> (OutcomeStatus, Vec<ErrorSummary>) {
        let mut errors = Vec::new();

        for child in &self.children {
            let StepResult::Failed(summary) = child.execute_sync(ctx) else {
                continue;
            };
            errors.push(summary);
            match self.strategy {
                FailureStrategy::Abort => return (OutcomeStatus::Failed, errors),
                FailureStrategy::Continue => {}
                FailureStrategy::Compensate => {
                    errors.extend(self.compensate_sync(ctx));
                    return (OutcomeStatus::Failed, errors);
                }
            }
        }

        let status = if errors.is_empty() { OutcomeStatus::Success } else { OutcomeStatus::Partial };
        (status, errors)
    }

    async fn walk_async(&self, ctx: &mut ExecutionContext<T>) -> (OutcomeStatus, Vec<ErrorSummary>) {
        let mut errors = Vec::new();

        for child in &self.children {
            let StepResult::Failed(summary) = child.execute_async(ctx).await else {
                continue;
            };
            errors.push(summary);
            match self.strategy {
                FailureStrategy::Abort => return (OutcomeStatus::Failed, errors),
                FailureStrategy::Continue => {}
                FailureStrategy::Compensate => {
                    errors.extend(self.compensate_async(ctx).await);
                    return (OutcomeStatus::Failed, errors);
                }
            }
        }

        let status = if errors.is_empty() { OutcomeStatus::Success } else { OutcomeStatus::Partial };
        (status, errors)
    }

    /// Run this orchestrator under the synchronous runner, consuming `ctx`
    /// and handing it back inside the returned [`Outcome`]. The only error
    /// this can return is [`ContractError::Reentrant`] — every other
    /// failure, including every leaf and compensator failure, ends up in
    /// `Outcome.errors` (SPEC_FULL.md §7).
    #[instrument(skip(self, ctx), fields(orchestrator = %self.name, strategy = ?self.strategy))]
    pub fn run_sync(&self, mut ctx: ExecutionContext<T>) -> Result<Outcome<T>, ContractError> {
        ctx.begin_run()?;
        let (status, errors) = self.walk_sync(&mut ctx);
        ctx.end_run();
        let duration_ms = ctx.elapsed_ms();
        info!(?status, duration_ms, errors = errors.len(), "orchestrator run complete");
        Ok(Outcome {
            status,
            errors,
            duration_ms,
            context: ctx,
        })
    }

    /// Run this orchestrator under the asynchronous runner. Same contract
    /// as [`Self::run_sync`].
    #[instrument(skip(self, ctx), fields(orchestrator = %self.name, strategy = ?self.strategy))]
    pub async fn run_async(&self, mut ctx: ExecutionContext<T>) -> Result<Outcome<T>, ContractError> {
        ctx.begin_run()?;
        let (status, errors) = self.walk_async(&mut ctx).await;
        ctx.end_run();
        let duration_ms = ctx.elapsed_ms();
        info!(?status, duration_ms, errors = errors.len(), "orchestrator run complete");
        Ok(Outcome {
            status,
            errors,
            duration_ms,
            context: ctx,
        })
    }
}
