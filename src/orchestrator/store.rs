//! Lifecycle state store: the single source of truth for job status,
//! mutated only by the orchestrator (including its adapter-resolution
//! continuations) and read as snapshots by the presentation layer.

use crate::imagegen::{Artifact, BackendError};
use crate::orchestrator::job::{GenerationJob, JobId, JobStatus};
use crate::planning::ScenePrompt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("illegal status transition for {id}: {from:?} → {to:?}")]
    InvalidTransition {
        id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
}

/// Observable job table. Every mutation bumps a revision on a watch
/// channel so a presentation layer can re-render per change without
/// polling.
pub struct JobTable {
    jobs: RwLock<Vec<GenerationJob>>,
    revision: watch::Sender<u64>,
}

impl JobTable {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            jobs: RwLock::new(Vec::new()),
            revision,
        }
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    /// Subscribe to change notifications. The value is an opaque
    /// monotonically increasing revision.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Replace the table with a fresh all-pending job set, one job per
    /// registry entry in registry order.
    pub async fn init(&self, registry: &[Arc<ScenePrompt>]) {
        let mut jobs = self.jobs.write().await;
        *jobs = registry
            .iter()
            .enumerate()
            .map(|(i, prompt)| GenerationJob::new(JobId(i), Arc::clone(prompt)))
            .collect();
        drop(jobs);
        self.bump();
    }

    /// Discard every job. Used by full session reset only.
    pub async fn clear(&self) {
        self.jobs.write().await.clear();
        self.bump();
    }

    /// Full point-in-time copy for rendering.
    pub async fn snapshot(&self) -> Vec<GenerationJob> {
        self.jobs.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// True once every job sits in a terminal state.
    pub async fn is_settled(&self) -> bool {
        self.jobs.read().await.iter().all(|j| j.status.is_terminal())
    }

    async fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        artifact: Option<Artifact>,
    ) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or(StoreError::UnknownJob(id))?;

        if !job.status.can_advance_to(&to) {
            return Err(StoreError::InvalidTransition {
                id,
                from: job.status.clone(),
                to,
            });
        }

        debug!(job = %id, from = ?job.status, to = ?to, "status transition");
        job.status = to;
        job.artifact = artifact;
        drop(jobs);
        self.bump();
        Ok(())
    }

    /// Mark one job as handed to the backend.
    pub async fn mark_in_flight(&self, id: JobId) -> Result<(), StoreError> {
        self.transition(id, JobStatus::InFlight, None).await
    }

    /// Record one call's resolution: the single write that moves a job
    /// out of `InFlight` into exactly one terminal state.
    pub async fn resolve(
        &self,
        id: JobId,
        outcome: Result<Artifact, BackendError>,
    ) -> Result<(), StoreError> {
        match outcome {
            Ok(artifact) => self.transition(id, JobStatus::Completed, Some(artifact)).await,
            Err(e) => {
                warn!(job = %id, error = %e, transient = e.is_transient(), "generation failed");
                self.transition(id, JobStatus::Failed(e.to_string()), None)
                    .await
            }
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::{AspectRatio, SceneCategory};

    fn registry(n: usize) -> Vec<Arc<ScenePrompt>> {
        (0..n)
            .map(|i| {
                Arc::new(ScenePrompt {
                    display_text: format!("scene {}", i),
                    generation_text: format!("the product in scene {}", i),
                    category: SceneCategory::PlainDisplay,
                    aspect_ratio: AspectRatio::Square,
                })
            })
            .collect()
    }

    fn artifact() -> Artifact {
        Artifact::Url("https://example.com/a.png".to_string())
    }

    #[tokio::test]
    async fn test_init_creates_pending_jobs_in_order() {
        let table = JobTable::new();
        table.init(&registry(3)).await;
        let jobs = table.snapshot().await;
        assert_eq!(jobs.len(), 3);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.id, JobId(i));
            assert_eq!(job.status, JobStatus::Pending);
            assert!(job.artifact.is_none());
        }
    }

    #[tokio::test]
    async fn test_completion_sets_artifact() {
        let table = JobTable::new();
        table.init(&registry(1)).await;
        table.mark_in_flight(JobId(0)).await.unwrap();
        table.resolve(JobId(0), Ok(artifact())).await.unwrap();

        let jobs = table.snapshot().await;
        assert_eq!(jobs[0].status, JobStatus::Completed);
        assert!(jobs[0].artifact.is_some());
    }

    #[tokio::test]
    async fn test_regressions_rejected() {
        let table = JobTable::new();
        table.init(&registry(1)).await;
        table.mark_in_flight(JobId(0)).await.unwrap();
        table.resolve(JobId(0), Ok(artifact())).await.unwrap();

        // completed → in-flight must never happen
        let err = table.mark_in_flight(JobId(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));

        // double resolution must never happen
        let err = table
            .resolve(JobId(0), Err(BackendError::Refused("x".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_requires_pending() {
        let table = JobTable::new();
        table.init(&registry(1)).await;
        table.mark_in_flight(JobId(0)).await.unwrap();
        assert!(table.mark_in_flight(JobId(0)).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_job_rejected() {
        let table = JobTable::new();
        table.init(&registry(1)).await;
        assert!(matches!(
            table.mark_in_flight(JobId(9)).await,
            Err(StoreError::UnknownJob(JobId(9)))
        ));
    }

    #[tokio::test]
    async fn test_watch_revision_advances_per_mutation() {
        let table = JobTable::new();
        let rx = table.subscribe();
        let before = *rx.borrow();

        table.init(&registry(2)).await;
        table.mark_in_flight(JobId(0)).await.unwrap();
        table.resolve(JobId(0), Ok(artifact())).await.unwrap();

        assert_eq!(*rx.borrow(), before + 3);
    }

    #[tokio::test]
    async fn test_settled_only_when_all_terminal() {
        let table = JobTable::new();
        table.init(&registry(2)).await;
        assert!(!table.is_settled().await);

        for i in 0..2 {
            table.mark_in_flight(JobId(i)).await.unwrap();
        }
        table.resolve(JobId(0), Ok(artifact())).await.unwrap();
        assert!(!table.is_settled().await);

        table
            .resolve(JobId(1), Err(BackendError::Refused("no".into())))
            .await
            .unwrap();
        assert!(table.is_settled().await);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_keep_distinct_jobs() {
        let table = Arc::new(JobTable::new());
        table.init(&registry(16)).await;
        for i in 0..16 {
            table.mark_in_flight(JobId(i)).await.unwrap();
        }

        let mut handles = Vec::new();
        for i in 0..16 {
            let t = Arc::clone(&table);
            handles.push(tokio::spawn(async move {
                t.resolve(JobId(i), Ok(artifact())).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(table.is_settled().await);
        let jobs = table.snapshot().await;
        assert!(jobs.iter().all(|j| j.status == JobStatus::Completed));
    }
}
