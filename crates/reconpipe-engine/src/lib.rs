//! reconpipe Engine - Stage pipeline and job management
//!
//! A job fans out over its targets; each target walks the fixed six-stage
//! plan. This crate owns:
//! - The stage plan and per-stage gating (`stage`, `executor`)
//! - Job lifecycle, concurrency limits and cancellation (`manager`)
//! - Job storage (`repository`)
//! - Progress accounting and outbound notifications (`progress`, `notify`)

pub mod executor;
pub mod manager;
pub mod notify;
pub mod progress;
pub mod repository;
pub mod stage;

#[cfg(test)]
mod testing;

pub use executor::{NoopObserver, PipelineExecutor, StageObserver};
pub use manager::JobManager;
pub use notify::{
    ChannelCriticalSink, CriticalAlert, CriticalFindingSink, LogCriticalSink, LogProgressReporter,
    ProgressQueue, ProgressReporter, ProgressUpdate,
};
pub use progress::ProgressTracker;
pub use repository::{InMemoryJobRepository, JobRepository};
pub use stage::{StageDefinition, StagePlan};
