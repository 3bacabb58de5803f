//! `Leaf` — an atomic executable wrapping one user function and an optional
//! compensator, each independently sync or async, plus a [`RetryPolicy`].
//!
//! Grounded in the teacher's `nodes::mock::MockNode` (the call-recording
//! shape) and `engine::executor::WorkflowExecutor::execute_with_retry` (the
//! attempt-loop / retryable-vs-fatal split), generalized to run under either
//! the sync or the async runner.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::context::{Detail, EventKind, ExecutionContext};
use crate::error::WorkflowError;
use crate::executable::Executable;
use crate::outcome::{ErrorSummary, StepResult};
use crate::retry::{JitterSampler, RandJitterSampler, RetryDecision, RetryPolicy};

type SyncFn<T> = dyn Fn(&mut ExecutionContext<T>) -> Result<(), WorkflowError> + Send + Sync;
type AsyncFn<T> =
    dyn for<'a> Fn(&'a mut ExecutionContext<T>) -> BoxFuture<'a, Result<(), WorkflowError>> + Send + Sync;

/// A leaf's main body or its compensator: exactly one of sync or async,
/// chosen at construction time. This *is* the "static inspection of the
/// callable" the language-neutral spec describes — in Rust the choice of
/// constructor already fixes the answer.
#[derive(Clone)]
pub enum LeafBody<T> {
    Sync(Arc<SyncFn<T>>),
    Async(Arc<AsyncFn<T>>),
}

impl<T> LeafBody<T> {
    fn is_async(&self) -> bool {
        matches!(self, LeafBody::Async(_))
    }

    fn call_sync(&self, ctx: &mut ExecutionContext<T>) -> Result<(), WorkflowError> {
        match self {
            LeafBody::Sync(f) => f(ctx),
            LeafBody::Async(_) => unreachable!("caller must check is_async before call_sync"),
        }
    }

    fn call_async<'a>(&'a self, ctx: &'a mut ExecutionContext<T>) -> Pin<Box<dyn Future<Output = Result<(), WorkflowError>> + Send + 'a>> {
        match self {
            LeafBody::Sync(f) => {
                let result = f(ctx);
                Box::pin(async move { result })
            }
            LeafBody::Async(f) => f(ctx),
        }
    }
}

/// An atomic unit of work: one user function, an optional compensator, and
/// a retry policy.
#[derive(Clone)]
pub struct Leaf<T> {
    name: String,
    description: String,
    body: LeafBody<T>,
    compensator: Option<LeafBody<T>>,
    retry: RetryPolicy,
    jitter_sampler: Arc<dyn JitterSampler>,
}

impl<T> Leaf<T> {
    /// Build a leaf around a synchronous user function.
    pub fn new_sync(
        name: impl Into<String>,
        description: impl Into<String>,
        retry: RetryPolicy,
        f: impl Fn(&mut ExecutionContext<T>) -> Result<(), WorkflowError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            body: LeafBody::Sync(Arc::new(f)),
            compensator: None,
            retry,
            jitter_sampler: Arc::new(RandJitterSampler),
        }
    }

    /// Build a leaf around an asynchronous user function.
    pub fn new_async<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        retry: RetryPolicy,
        f: F,
    ) -> Self
    where
        F: Fn(&mut ExecutionContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        let wrapped = move |ctx: &mut ExecutionContext<T>| -> BoxFuture<'_, Result<(), WorkflowError>> { Box::pin(f(ctx)) };
        Self {
            name: name.into(),
            description: description.into(),
            body: LeafBody::Async(Arc::new(wrapped)),
            compensator: None,
            retry,
            jitter_sampler: Arc::new(RandJitterSampler),
        }
    }

    /// Attach a synchronous compensator.
    #[must_use]
    pub fn with_compensator_sync(
        mut self,
        f: impl Fn(&mut ExecutionContext<T>) -> Result<(), WorkflowError> + Send + Sync + 'static,
    ) -> Self {
        self.compensator = Some(LeafBody::Sync(Arc::new(f)));
        self
    }

    /// Attach an asynchronous compensator.
    #[must_use]
    pub fn with_compensator_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(&mut ExecutionContext<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), WorkflowError>> + Send + 'static,
    {
        let wrapped = move |ctx: &mut ExecutionContext<T>| -> BoxFuture<'_, Result<(), WorkflowError>> { Box::pin(f(ctx)) };
        self.compensator = Some(LeafBody::Async(Arc::new(wrapped)));
        self
    }

    /// Override the jitter sampler (tests substitute a deterministic one).
    #[must_use]
    pub fn with_jitter_sampler(mut self, sampler: Arc<dyn JitterSampler>) -> Self {
        self.jitter_sampler = sampler;
        self
    }

    pub fn has_compensator(&self) -> bool {
        self.compensator.is_some()
    }

    pub fn compensator_is_async(&self) -> bool {
        self.compensator.as_ref().is_some_and(LeafBody::is_async)
    }

    /// Run the compensator (if any) under the synchronous runner. Async
    /// compensators under the sync runner are a `runner_mismatch`,
    /// recorded as a compensation error (SPEC_FULL.md §4.3).
    pub fn compensate_sync(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        let Some(comp) = &self.compensator else {
            return StepResult::Success;
        };
        ctx.emit(EventKind::CompensateStart, &self.name, 1, Detail::Text("compensating".into()));

        if comp.is_async() {
            let err = WorkflowError::runner_mismatch(format!(
                "leaf '{}' has an async compensator but is running under the sync runner",
                self.name
            ));
            let summary = ErrorSummary::new(&self.name, &err);
            ctx.emit(EventKind::CompensateError, &self.name, 1, Detail::Error(summary.clone()));
            return StepResult::Failed(summary);
        }

        match comp.call_sync(ctx) {
            Ok(()) => {
                ctx.emit(EventKind::CompensateEnd, &self.name, 1, Detail::Text("compensated".into()));
                StepResult::Success
            }
            Err(e) => {
                let summary = ErrorSummary::new(&self.name, &e);
                ctx.emit(EventKind::CompensateError, &self.name, 1, Detail::Error(summary.clone()));
                StepResult::Failed(summary)
            }
        }
    }

    /// Run the compensator (if any) under the asynchronous runner.
    pub async fn compensate_async(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        let Some(comp) = &self.compensator else {
            return StepResult::Success;
        };
        ctx.emit(EventKind::CompensateStart, &self.name, 1, Detail::Text("compensating".into()));

        match comp.call_async(ctx).await {
            Ok(()) => {
                ctx.emit(EventKind::CompensateEnd, &self.name, 1, Detail::Text("compensated".into()));
                StepResult::Success
            }
            Err(e) => {
                let summary = ErrorSummary::new(&self.name, &e);
                ctx.emit(EventKind::CompensateError, &self.name, 1, Detail::Error(summary.clone()));
                StepResult::Failed(summary)
            }
        }
    }

    fn mismatch_result(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        ctx.emit(EventKind::Start, &self.name, 1, Detail::Text("starting".into()));
        let err = WorkflowError::runner_mismatch(format!(
            "leaf '{}' is async but is running under the sync runner",
            self.name
        ));
        let summary = ErrorSummary::new(&self.name, &err);
        ctx.emit(EventKind::Error, &self.name, 1, Detail::Error(summary.clone()));
        StepResult::Failed(summary)
    }

    /// Synthesize a `cancelled` failure (SPEC_FULL.md §4.5). Recorded as an
    /// ordinary terminal `error` event so the enclosing orchestrator's
    /// `FailureStrategy` treats it exactly like any other leaf failure.
    fn cancelled_result(&self, ctx: &mut ExecutionContext<T>, attempt: u32) -> StepResult {
        let summary = ErrorSummary::new(&self.name, &WorkflowError::cancelled());
        ctx.emit(EventKind::Error, &self.name, attempt, Detail::Error(summary.clone()));
        StepResult::Failed(summary)
    }
}

#[async_trait]
impl<T: Send + Sync> Executable<T> for Leaf<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_async(&self) -> bool {
        self.body.is_async()
    }

    fn execute_sync(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        if self.body.is_async() {
            return self.mismatch_result(ctx);
        }

        let mut attempt = 1u32;
        loop {
            ctx.emit(EventKind::Start, &self.name, attempt, Detail::Text("starting".into()));
            match self.body.call_sync(ctx) {
                Ok(()) => {
                    ctx.emit(EventKind::End, &self.name, attempt, Detail::Text("succeeded".into()));
                    ctx.mark_completed(self.name.clone());
                    return StepResult::Success;
                }
                Err(e) => {
                    let summary = ErrorSummary::new(&self.name, &e);
                    match self.retry.decide(&e, attempt, self.jitter_sampler.as_ref()) {
                        RetryDecision::Retry { delay, next_attempt } => {
                            warn!(node = %self.name, attempt, next_attempt, ?delay, "leaf failed, retrying");
                            ctx.emit(
                                EventKind::Retry,
                                &self.name,
                                attempt,
                                Detail::Text(format!("{}; next_delay_ms={}", e.message, delay.as_millis())),
                            );
                            std::thread::sleep(delay);
                            attempt = next_attempt;
                        }
                        RetryDecision::GiveUp => {
                            error!(node = %self.name, attempt, kind = %e.kind, "leaf failed terminally");
                            ctx.emit(EventKind::Error, &self.name, attempt, Detail::Error(summary.clone()));
                            return StepResult::Failed(summary);
                        }
                    }
                }
            }
        }
    }

    async fn execute_async(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        let mut attempt = 1u32;
        loop {
            if ctx.is_cancelled() {
                return self.cancelled_result(ctx, attempt);
            }
            ctx.emit(EventKind::Start, &self.name, attempt, Detail::Text("starting".into()));
            match self.body.call_async(ctx).await {
                Ok(()) => {
                    ctx.emit(EventKind::End, &self.name, attempt, Detail::Text("succeeded".into()));
                    ctx.mark_completed(self.name.clone());
                    return StepResult::Success;
                }
                Err(e) => {
                    let summary = ErrorSummary::new(&self.name, &e);
                    match self.retry.decide(&e, attempt, self.jitter_sampler.as_ref()) {
                        RetryDecision::Retry { delay, next_attempt } => {
                            warn!(node = %self.name, attempt, next_attempt, ?delay, "leaf failed, retrying");
                            ctx.emit(
                                EventKind::Retry,
                                &self.name,
                                attempt,
                                Detail::Text(format!("{}; next_delay_ms={}", e.message, delay.as_millis())),
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = ctx.cancelled() => {
                                    return self.cancelled_result(ctx, attempt);
                                }
                            }
                            attempt = next_attempt;
                        }
                        RetryDecision::GiveUp => {
                            error!(node = %self.name, attempt, kind = %e.kind, "leaf failed terminally");
                            ctx.emit(EventKind::Error, &self.name, attempt, Detail::Error(summary.clone()));
                            return StepResult::Failed(summary);
                        }
                    }
                }
            }
        }
    }

    fn is_compensable(&self) -> bool {
        Leaf::has_compensator(self)
    }

    fn compensate_sync(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        Leaf::compensate_sync(self, ctx)
    }

    async fn compensate_async(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        Leaf::compensate_async(self, ctx).await
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a dyn Executable<T>>) {
        out.push(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::{Backoff, FixedJitterSampler};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn instant_retry_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(0),
            backoff: Backoff::Fixed,
            jitter_fraction: 0.0,
            retry_on: Default::default(),
            give_up_on: Default::default(),
        }
    }

    #[test]
    fn sync_leaf_succeeds_on_first_attempt() {
        let leaf: Leaf<i32> = Leaf::new_sync("inc", "", RetryPolicy::default(), |ctx| {
            ctx.data += 1;
            Ok(())
        });
        let mut ctx = ExecutionContext::new(0);
        let result = leaf.execute_sync(&mut ctx);
        assert!(result.is_success());
        assert_eq!(ctx.data, 1);
        assert!(ctx.was_completed("inc"));
        assert_eq!(ctx.trace.len(), 2); // start + end
    }

    #[test]
    fn sync_leaf_retries_then_succeeds() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let leaf: Leaf<()> = Leaf::new_sync("flaky", "", instant_retry_policy(3), move |_ctx| {
            let n = calls_clone.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(WorkflowError::user("transient", "boom"))
            } else {
                Ok(())
            }
        })
        .with_jitter_sampler(Arc::new(FixedJitterSampler(0.0)));

        let mut ctx = ExecutionContext::new(());
        let result = leaf.execute_sync(&mut ctx);
        assert!(result.is_success());
        assert!(ctx.was_completed("flaky"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        use crate::context::EventKind;
        let kinds: Vec<_> = ctx.trace.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Start, EventKind::Error, EventKind::Retry, EventKind::Start, EventKind::End]
        );
    }

    #[test]
    fn give_up_on_stops_retrying_immediately() {
        let mut retry = instant_retry_policy(5);
        retry.give_up_on.insert("fatal".to_string());
        let leaf: Leaf<()> = Leaf::new_sync("boom", "", retry, |_ctx| Err(WorkflowError::user("fatal", "nope")));
        let mut ctx = ExecutionContext::new(());
        let result = leaf.execute_sync(&mut ctx);
        assert!(!result.is_success());
        assert!(!ctx.was_completed("boom"));
        assert_eq!(ctx.trace.len(), 2); // start + error, no retry
    }

    #[test]
    fn async_leaf_under_sync_runner_is_a_runner_mismatch() {
        let leaf: Leaf<()> = Leaf::new_async("remote", "", RetryPolicy::default(), |_ctx| async { Ok(()) });
        let mut ctx = ExecutionContext::new(());
        let result = leaf.execute_sync(&mut ctx);
        match result {
            StepResult::Failed(summary) => assert_eq!(summary.kind, "runner_mismatch"),
            StepResult::Success => panic!("expected runner_mismatch"),
        }
        assert!(!ctx.was_completed("remote"));
    }

    #[tokio::test]
    async fn async_leaf_succeeds_under_async_runner() {
        let leaf: Leaf<i32> = Leaf::new_async("inc", "", RetryPolicy::default(), |ctx| async move {
            ctx.data += 1;
            Ok(())
        });
        let mut ctx = ExecutionContext::new(0);
        let result = leaf.execute_async(&mut ctx).await;
        assert!(result.is_success());
        assert_eq!(ctx.data, 1);
    }

    #[tokio::test]
    async fn sync_leaf_runs_inline_under_async_runner() {
        let leaf: Leaf<i32> = Leaf::new_sync("inc", "", RetryPolicy::default(), |ctx| {
            ctx.data += 1;
            Ok(())
        });
        let mut ctx = ExecutionContext::new(0);
        let result = leaf.execute_async(&mut ctx).await;
        assert!(result.is_success());
        assert_eq!(ctx.data, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn async_retry_backoff_honors_linear_delay_under_virtual_time() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(100),
            backoff: Backoff::Linear,
            jitter_fraction: 0.0,
            retry_on: Default::default(),
            give_up_on: Default::default(),
        };
        let leaf: Leaf<()> = Leaf::new_async("flaky", "", policy, move |_ctx| {
            let calls = calls_clone.clone();
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(WorkflowError::user("transient", "boom"))
                } else {
                    Ok(())
                }
            }
        })
        .with_jitter_sampler(Arc::new(FixedJitterSampler(0.0)));

        let mut ctx = ExecutionContext::new(());
        let start = tokio::time::Instant::now();
        let result = leaf.execute_async(&mut ctx).await;
        let elapsed = start.elapsed();

        assert!(result.is_success());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Linear backoff: 100ms before attempt 2, 200ms before attempt 3.
        assert_eq!(elapsed, Duration::from_millis(300));
    }

    #[test]
    fn async_compensator_under_sync_runner_is_recorded_as_compensate_error() {
        let leaf: Leaf<()> = Leaf::new_sync("a", "", RetryPolicy::default(), |_ctx| Ok(()))
            .with_compensator_async(|_ctx| async { Ok(()) });
        let mut ctx = ExecutionContext::new(());
        leaf.execute_sync(&mut ctx);
        let result = leaf.compensate_sync(&mut ctx);
        match result {
            StepResult::Failed(summary) => assert_eq!(summary.kind, "runner_mismatch"),
            StepResult::Success => panic!("expected runner_mismatch"),
        }
    }
}
