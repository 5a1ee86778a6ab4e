use crate::imagegen::Artifact;
use crate::planning::ScenePrompt;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Stable job identifier, derived from the prompt's position in the scene
/// registry. Doubles as the deduplication key in the dispatch ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub usize);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene-{}", self.0)
    }
}

/// Forward-only lifecycle state. The only legal walks are prefixes of
/// `Pending → InFlight → Completed` or `Pending → InFlight → Failed`;
/// adapter-internal retries never show up here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    InFlight,
    Completed,
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }

    /// Whether a transition from `self` to `next` moves the state machine
    /// forward. Everything else is a regression or a repeat and is
    /// rejected by the store.
    pub fn can_advance_to(&self, next: &JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InFlight)
                | (JobStatus::InFlight, JobStatus::Completed)
                | (JobStatus::InFlight, JobStatus::Failed(_))
        )
    }
}

/// One scene prompt tracked from submission to a terminal outcome. The
/// prompt itself is shared and read-only.
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: JobId,
    pub prompt: Arc<ScenePrompt>,
    pub status: JobStatus,
    /// Set exactly when `status` becomes `Completed`.
    pub artifact: Option<Artifact>,
}

impl GenerationJob {
    pub fn new(id: JobId, prompt: Arc<ScenePrompt>) -> Self {
        Self {
            id,
            prompt,
            status: JobStatus::Pending,
            artifact: None,
        }
    }
}
