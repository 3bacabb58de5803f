//! `SyncRunner` / `AsyncRunner` — the two execution drivers. Both delegate
//! the actual tree walk to [`Orchestrator::run_sync`]/[`Orchestrator::
//! run_async`]; they differ only in which of those they call and in
//! whether cancellation is even possible (SPEC_FULL.md §4.5/§5).

use tokio_util::sync::CancellationToken;
use tracing::instrument;

use nodes::{ContractError, ExecutionContext, Outcome};

use crate::orchestrator::Orchestrator;

/// Single-threaded, strictly sequential. An async leaf or compensator is
/// detected at its own boundary and surfaces as a `runner_mismatch` entry
/// in `Outcome.errors` — never silently tolerated, never raised to the
/// caller. No cancellation support at all: the type simply has no token
/// parameter to accept one.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncRunner;

impl SyncRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `orchestrator` against `ctx`, consuming it and handing it back
    /// inside the returned [`Outcome`]. The only error ever raised is a
    /// [`ContractError`] (a re-entrant context); every other failure lives
    /// in `Outcome.errors`.
    #[instrument(skip(self, orchestrator, ctx), fields(orchestrator = %orchestrator.name()))]
    pub fn run<T: Send + Sync>(
        &self,
        orchestrator: &Orchestrator<T>,
        ctx: ExecutionContext<T>,
    ) -> Result<Outcome<T>, ContractError> {
        orchestrator.run_sync(ctx)
    }
}

/// Single-threaded, cooperative. Executes async leaves by awaiting their
/// suspendable and synchronous leaves inline — no worker-pool offload;
/// callers who need that wrap their sync function themselves.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsyncRunner;

impl AsyncRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `orchestrator` against `ctx`. When `cancellation` is supplied it
    /// is attached to the context before the walk begins; the next leaf
    /// boundary or retry backoff sleep after cancellation is requested
    /// synthesizes a `cancelled` failure for the in-flight leaf, which then
    /// obeys the orchestrator's configured `FailureStrategy` exactly like
    /// any other leaf failure — including triggering compensation under
    /// the `compensate` strategy.
    #[instrument(skip(self, orchestrator, ctx, cancellation), fields(orchestrator = %orchestrator.name()))]
    pub async fn run<T: Send + Sync>(
        &self,
        orchestrator: &Orchestrator<T>,
        ctx: ExecutionContext<T>,
        cancellation: Option<CancellationToken>,
    ) -> Result<Outcome<T>, ContractError> {
        let ctx = match cancellation {
            Some(token) => ctx.with_cancellation(token),
            None => ctx,
        };
        orchestrator.run_async(ctx).await
    }
}
