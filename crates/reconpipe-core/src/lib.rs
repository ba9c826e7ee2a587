//! reconpipe Core - Data model and error handling
//!
//! This crate provides the types shared by every reconpipe crate:
//! - `ScanJob`: One scan request spanning one or more targets
//! - `TargetResult`: Per-target, per-stage outcomes and artifacts
//! - `Finding`: A normalized vulnerability or observation record
//! - `ScanModule`, `StageKind`: The requestable modules and the fixed stage sequence
//! - `Severity`, `ScanTarget`, `Error`

pub mod error;
pub mod finding;
pub mod job;
pub mod module;
pub mod severity;
pub mod target;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use finding::{Finding, FindingBuilder, SourceTool};
pub use job::{
    JobStatus, OpenPort, ScanJob, SpecializedRun, StageOutcome, StageStatus, TargetArtifacts,
    TargetResult, VulnerabilityCounts, WebService,
};
pub use module::{ModuleSet, ScanModule, ScanProfile, StageKind};
pub use severity::Severity;
pub use target::{parse_target_list, ScanTarget};
