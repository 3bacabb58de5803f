//! `Manifest` — a deterministic, serializable description of an
//! orchestrator's shape, for semantic introspection (SPEC_FULL.md §4.6/§6).

use serde::{Deserialize, Serialize};

use crate::orchestrator::{FailureStrategy, Orchestrator};

/// One entry in a [`Manifest`]'s `steps` list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepManifest {
    pub name: String,
    pub description: String,
    pub is_async: bool,
}

/// A plain structured description of an orchestrator. Deterministic: the
/// same tree always produces the same manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub strategy: FailureStrategy,
    pub steps: Vec<StepManifest>,
}

impl<T: Send + Sync> Orchestrator<T> {
    /// Describe this orchestrator's immediate children. A nested `Sequence`
    /// appears as one step (its own name/description), not flattened — the
    /// manifest mirrors the orchestrator's declared shape, not its full
    /// leaf set (the full leaf set is only ever needed internally, by
    /// compensation).
    pub fn manifest(&self) -> Manifest {
        Manifest {
            name: self.name().to_string(),
            description: self.description().to_string(),
            strategy: self.strategy(),
            steps: self
                .children()
                .iter()
                .map(|c| StepManifest {
                    name: c.name().to_string(),
                    description: c.description().to_string(),
                    is_async: c.is_async(),
                })
                .collect(),
        }
    }
}
