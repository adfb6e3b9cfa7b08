//! Concrete pipeline stages, in the order the orchestrator composes them.

pub mod change_detection;
pub mod local_metadata;
pub mod resolution;
pub mod traversal;

pub use change_detection::{
    ChangeDetectionStage, KnownPath, KnownPathCache, KnownPathSnapshot,
};
pub use local_metadata::LocalMetadataStage;
pub use resolution::ResolutionStage;
pub use traversal::DirectoryTraversalStage;
