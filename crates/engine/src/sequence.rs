//! `Sequence` — an ordered composite with no failure policy of its own.
//! Short-circuits on the first failing child and propagates that failure
//! unchanged (SPEC_FULL.md §4.2).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use nodes::{ContractError, Executable, ExecutionContext, StepResult};

/// An ordered list of children, executed one after another against the
/// shared context. Never interacts with compensation directly — it merely
/// propagates a child's failure to whatever composite holds it.
pub struct Sequence<T> {
    name: String,
    description: String,
    children: Vec<Arc<dyn Executable<T>>>,
    is_async: bool,
}

impl<T> Sequence<T> {
    /// Build a sequence from its children, in execution order.
    ///
    /// # Errors
    /// Returns [`ContractError::DuplicateName`] if two children share a name
    /// — malformed trees are rejected at construction time, never at
    /// run time (SPEC_FULL.md §7).
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
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
            children,
            is_async,
        })
    }

    pub fn children(&self) -> &[Arc<dyn Executable<T>>] {
        &self.children
    }
}

#[async_trait]
impl<T: Send + Sync> Executable<T> for Sequence<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn is_async(&self) -> bool {
        self.is_async
    }

    fn execute_sync(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        for child in &self.children {
            let result = child.execute_sync(ctx);
            if !result.is_success() {
                return result;
            }
        }
        StepResult::Success
    }

    async fn execute_async(&self, ctx: &mut ExecutionContext<T>) -> StepResult {
        for child in &self.children {
            let result = child.execute_async(ctx).await;
            if !result.is_success() {
                return result;
            }
        }
        StepResult::Success
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a dyn Executable<T>>) {
        for child in &self.children {
            child.collect_leaves(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::{Leaf, RetryPolicy, WorkflowError};

    fn ok_leaf(name: &str) -> Arc<dyn Executable<i32>> {
        Arc::new(Leaf::new_sync(name, "", RetryPolicy::default(), |ctx| {
            ctx.data += 1;
            Ok(())
        }))
    }

    fn failing_leaf(name: &str) -> Arc<dyn Executable<i32>> {
        Arc::new(Leaf::new_sync(name, "", RetryPolicy::default(), |_ctx| {
            Err(WorkflowError::user("boom", "nope"))
        }))
    }

    #[test]
    fn runs_children_in_order() {
        let seq = Sequence::new("s", "", vec![ok_leaf("a"), ok_leaf("b"), ok_leaf("c")]).unwrap();
        let mut ctx = ExecutionContext::new(0);
        let result = seq.execute_sync(&mut ctx);
        assert!(result.is_success());
        assert_eq!(ctx.data, 3);
        assert!(ctx.was_completed("a") && ctx.was_completed("b") && ctx.was_completed("c"));
    }

    #[test]
    fn short_circuits_on_first_failure() {
        let seq = Sequence::new("s", "", vec![ok_leaf("a"), failing_leaf("b"), ok_leaf("c")]).unwrap();
        let mut ctx = ExecutionContext::new(0);
        let result = seq.execute_sync(&mut ctx);
        assert!(!result.is_success());
        assert_eq!(ctx.data, 1);
        assert!(ctx.was_completed("a"));
        assert!(!ctx.was_completed("c"));
    }

    #[test]
    fn rejects_duplicate_child_names() {
        let err = Sequence::new("s", "", vec![ok_leaf("a"), ok_leaf("a")]).unwrap_err();
        assert_eq!(err, ContractError::DuplicateName("a".to_string()));
    }

    #[test]
    fn collect_leaves_is_preorder_flat() {
        let inner = Arc::new(Sequence::new("inner", "", vec![ok_leaf("b"), ok_leaf("c")]).unwrap());
        let outer = Sequence::new(
            "outer",
            "",
            vec![ok_leaf("a"), inner as Arc<dyn Executable<i32>>, ok_leaf("d")],
        )
        .unwrap();
        let mut leaves = Vec::new();
        outer.collect_leaves(&mut leaves);
        let names: Vec<_> = leaves.iter().map(|l| l.name()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }
}
