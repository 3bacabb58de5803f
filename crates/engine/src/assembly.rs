//! Dynamic assembly — construct a runnable `Orchestrator` from a declarative
//! descriptor plus a registry of known leaves. Never executes arbitrary
//! code: only pre-registered leaves can be referenced. This is the security
//! boundary for LLM-driven construction (SPEC_FULL.md §4.6).

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use nodes::{Executable, Leaf};

use crate::error::AssemblyError;
use crate::orchestrator::{FailureStrategy, Orchestrator};

/// Maps a step name to a registered leaf. Only entries present here can be
/// referenced by a descriptor — this is the whole of the security boundary.
pub type LeafRegistry<T> = HashMap<String, Arc<Leaf<T>>>;

/// The wire shape of a dynamic-assembly request (SPEC_FULL.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<String>,
    pub strategy: String,
}

/// Validate `descriptor` against `registry` and, if valid, build the
/// orchestrator it describes. Validation — the strategy tag, then every
/// step name — happens in full before anything is constructed, so a
/// failing assembly never partially builds an `Orchestrator`.
///
/// # Errors
/// [`AssemblyError::InvalidStrategy`] if `descriptor.strategy` isn't
/// `abort`/`continue`/`compensate`; [`AssemblyError::UnknownStep`] if any
/// step name has no entry in `registry`.
pub fn assemble<T: Send + Sync + 'static>(
    descriptor: &AssemblyDescriptor,
    registry: &LeafRegistry<T>,
) -> Result<Orchestrator<T>, AssemblyError> {
    let strategy = FailureStrategy::parse(&descriptor.strategy)
        .ok_or_else(|| AssemblyError::InvalidStrategy(descriptor.strategy.clone()))?;

    let mut children: Vec<Arc<dyn Executable<T>>> = Vec::with_capacity(descriptor.steps.len());
    for step in &descriptor.steps {
        let leaf = registry
            .get(step)
            .ok_or_else(|| AssemblyError::UnknownStep(step.clone()))?;
        children.push(leaf.clone() as Arc<dyn Executable<T>>);
    }

    Ok(Orchestrator::new(
        descriptor.name.clone(),
        descriptor.description.clone(),
        strategy,
        children,
    )?)
}
