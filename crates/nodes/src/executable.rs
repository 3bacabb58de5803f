//! `Executable` — the contract shared by [`crate::leaf::Leaf`] and (in the
//! `engine` crate) `Sequence`: "execute against a context, produce a
//! [`crate::outcome::StepResult`], emit a trace".

use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::outcome::StepResult;

/// Implemented by [`crate::leaf::Leaf`] and `engine::Sequence`. Deliberately
/// *not* implemented by `engine::Orchestrator` — see SPEC_FULL.md §3 for why
/// the orchestrator is always the tree root rather than a nestable node.
#[async_trait]
pub trait Executable<T>: Send + Sync {
    /// Unique within the immediate parent; globally addressable by path.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Statically known: true if this node (or any descendant, for a
    /// composite) is async.
    fn is_async(&self) -> bool;

    /// Execute under the synchronous runner. Implementations must not
    /// construct or poll any suspendable value when `is_async()` is true.
    fn execute_sync(&self, ctx: &mut ExecutionContext<T>) -> StepResult;

    /// Execute under the cooperative asynchronous runner.
    async fn execute_async(&self, ctx: &mut ExecutionContext<T>) -> StepResult;

    /// Whether this node is a leaf that declared a compensator. Composites
    /// never compensate directly — `false` by default and left unoverridden
    /// by `Sequence`; only `Leaf` overrides it.
    fn is_compensable(&self) -> bool {
        false
    }

    /// Run this node's compensator under the synchronous runner. A no-op
    /// for anything but a compensable leaf.
    fn compensate_sync(&self, _ctx: &mut ExecutionContext<T>) -> StepResult {
        StepResult::Success
    }

    /// Run this node's compensator under the asynchronous runner.
    async fn compensate_async(&self, _ctx: &mut ExecutionContext<T>) -> StepResult {
        StepResult::Success
    }

    /// Depth-first, pre-order collection of every leaf reachable from this
    /// node: a plain `Leaf` yields itself; a composite recurses into its
    /// children. `Orchestrator` calls this over its own children to build
    /// the LIFO compensation order (SPEC_FULL.md §4.3). No default body —
    /// each implementing type's notion of "reachable leaves" differs, and a
    /// generic default can't unsize an abstract `Self` into the trait
    /// object this returns.
    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a dyn Executable<T>>);
}
