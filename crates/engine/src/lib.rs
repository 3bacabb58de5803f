//! `engine` crate — composition (`Sequence`, `Orchestrator`), failure
//! strategies and compensation, the sync/async runners, and the manifest +
//! dynamic-assembly layer, built on top of `nodes`'s `Executable` contract.

pub mod assembly;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod runner;
pub mod sequence;

pub use assembly::{assemble, AssemblyDescriptor, LeafRegistry};
pub use error::AssemblyError;
pub use manifest::{Manifest, StepManifest};
pub use orchestrator::{FailureStrategy, Orchestrator};
pub use runner::{AsyncRunner, SyncRunner};
pub use sequence::Sequence;
