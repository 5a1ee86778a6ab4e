//! The scheduler: drives every job to a terminal state exactly once,
//! honoring the active backend's dispatch profile.

use crate::imagegen::{Concurrency, GenerationRequest, ImageBackend};
use crate::orchestrator::job::{JobId, JobStatus};
use crate::orchestrator::store::JobTable;
use crate::planning::ScenePrompt;
use crate::product::ProductInput;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Owns the job table and the dispatch ledger. Dispatch is explicit
/// (driven by [`Orchestrator::run`]) rather than re-scanned on every
/// state change; the ledger guarantees a job is handed to a backend at
/// most once even under re-entrant runs.
pub struct Orchestrator {
    table: Arc<JobTable>,
    ledger: Mutex<HashSet<JobId>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            table: Arc::new(JobTable::new()),
            ledger: Mutex::new(HashSet::new()),
        }
    }

    /// The observable state store. External components read snapshots and
    /// subscribe to change notifications through this handle; they never
    /// write.
    pub fn table(&self) -> &Arc<JobTable> {
        &self.table
    }

    /// Build one pending job per registry entry, discarding any prior job
    /// set and ledger contents.
    pub async fn load_registry(&self, registry: Vec<ScenePrompt>) {
        let prompts: Vec<Arc<ScenePrompt>> = registry.into_iter().map(Arc::new).collect();
        self.table.init(&prompts).await;
        self.ledger.lock().unwrap().clear();
        info!(jobs = prompts.len(), "registry loaded");
    }

    /// Discard all jobs and ledger state, returning to the planning stage.
    pub async fn reset(&self) {
        self.table.clear().await;
        self.ledger.lock().unwrap().clear();
    }

    /// Claim every job that is pending and not yet ledgered. Ledger
    /// insertion happens under one lock acquisition with no intervening
    /// await, so two overlapping runs can never claim the same job; the
    /// in-flight marks follow immediately after.
    async fn claim_pending(&self) -> Vec<(JobId, Arc<ScenePrompt>)> {
        let snapshot = self.table.snapshot().await;

        let claimed: Vec<(JobId, Arc<ScenePrompt>)> = {
            let mut ledger = self.ledger.lock().unwrap();
            let mut claimed = Vec::new();
            for job in snapshot {
                if job.status == JobStatus::Pending && ledger.insert(job.id) {
                    claimed.push((job.id, job.prompt));
                }
            }
            claimed
        };

        for (id, _) in &claimed {
            // Only fails if the table was reset between snapshot and mark;
            // the claim is then moot.
            if let Err(e) = self.table.mark_in_flight(*id).await {
                debug!(job = %id, error = %e, "in-flight mark rejected");
            }
        }

        claimed
    }

    /// Dispatch all eligible jobs against `backend` and drive them to
    /// terminal states. Idempotent: a run that finds nothing eligible is
    /// a no-op, so overlapping calls are safe.
    pub async fn run(&self, backend: Arc<dyn ImageBackend>, product: &ProductInput) {
        let claimed = self.claim_pending().await;
        if claimed.is_empty() {
            return;
        }

        let profile = backend.profile();
        info!(
            backend = backend.id(),
            jobs = claimed.len(),
            concurrency = ?profile.concurrency,
            "dispatching batch"
        );

        let image = Arc::new(product.image.clone());
        let requests: Vec<(JobId, GenerationRequest)> = claimed
            .iter()
            .map(|(id, prompt)| {
                (*id, GenerationRequest::new(product, Arc::clone(&image), prompt))
            })
            .collect();

        match profile.concurrency {
            Concurrency::Unbounded => {
                // All calls in flight at once; each resolution lands
                // independently, in no particular order.
                let futures = requests.into_iter().map(|(id, request)| {
                    let backend = Arc::clone(&backend);
                    let table = Arc::clone(&self.table);
                    async move {
                        let outcome = backend.generate(&request).await;
                        if let Err(e) = table.resolve(id, outcome).await {
                            debug!(job = %id, error = %e, "resolution dropped");
                        }
                    }
                });
                join_all(futures).await;
            }
            Concurrency::Serial => {
                // One at a time in registry order, with the gap floor
                // between a resolution and the next submission. A failed
                // job never blocks its successors.
                let last = requests.len().saturating_sub(1);
                for (i, (id, request)) in requests.into_iter().enumerate() {
                    let outcome = backend.generate(&request).await;
                    if let Err(e) = self.table.resolve(id, outcome).await {
                        debug!(job = %id, error = %e, "resolution dropped");
                    }
                    if i < last && !profile.min_request_gap.is_zero() {
                        tokio::time::sleep(profile.min_request_gap).await;
                    }
                }
            }
        }
    }

    /// Number of jobs ever handed to a backend this session. Exposed for
    /// invariant checks only.
    #[cfg(test)]
    pub(crate) fn ledger_len(&self) -> usize {
        self.ledger.lock().unwrap().len()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
