//! Generation task orchestration: converts the selected scene registry
//! into jobs, dispatches each exactly once against the active backend
//! under that backend's concurrency profile, and tracks per-job lifecycle
//! state for the presentation layer.

pub mod job;
pub mod scheduler;
pub mod store;

#[cfg(test)]
mod tests;

pub use job::{GenerationJob, JobId, JobStatus};
pub use scheduler::Orchestrator;
pub use store::{JobTable, StoreError};
