use crate::imagegen::{
    Artifact, BackendError, DispatchProfile, GenerationRequest, ImageBackend,
};
use crate::orchestrator::job::JobStatus;
use crate::orchestrator::scheduler::Orchestrator;
use crate::planning::ScenePrompt;
use crate::product::{
    default_generation_configs, AspectRatio, ImageBlob, ProductInput, SceneCategory,
    TargetLanguage,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ── Scripted backend ────────────────────────────────────────

type Behavior = dyn Fn(&str) -> Result<Artifact, BackendError> + Send + Sync;

/// Test double recording every call: which prompt, when it started, when
/// it resolved. Behavior and per-prompt delay are scripted by prompt text.
struct ScriptedBackend {
    profile: DispatchProfile,
    calls: AtomicUsize,
    behavior: Box<Behavior>,
    delay_for: Box<dyn Fn(&str) -> Duration + Send + Sync>,
    log: Mutex<Vec<CallRecord>>,
}

#[derive(Clone)]
struct CallRecord {
    prompt: String,
    started: Instant,
    resolved: Instant,
}

impl ScriptedBackend {
    fn succeeding(profile: DispatchProfile) -> Self {
        Self::new(profile, |_| Ok(Artifact::Url("https://img.example/ok.png".into())))
    }

    fn new(
        profile: DispatchProfile,
        behavior: impl Fn(&str) -> Result<Artifact, BackendError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            profile,
            calls: AtomicUsize::new(0),
            behavior: Box::new(behavior),
            delay_for: Box::new(|_| Duration::ZERO),
            log: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, f: impl Fn(&str) -> Duration + Send + Sync + 'static) -> Self {
        self.delay_for = Box::new(f);
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn log(&self) -> Vec<CallRecord> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn profile(&self) -> DispatchProfile {
        self.profile
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let delay = (self.delay_for)(&request.prompt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let outcome = (self.behavior)(&request.prompt);
        self.log.lock().unwrap().push(CallRecord {
            prompt: request.prompt.clone(),
            started,
            resolved: Instant::now(),
        });
        outcome
    }
}

// ── Fixtures ────────────────────────────────────────────────

fn product() -> ProductInput {
    ProductInput {
        name: "Travel kettle".to_string(),
        selling_points: "compact, boils in 3 minutes".to_string(),
        image: ImageBlob::new("image/png", vec![0x89, 0x50, 0x4E, 0x47]),
        source_url: None,
        target_language: TargetLanguage::En,
        remove_background: false,
        generation_configs: default_generation_configs(),
    }
}

fn registry(n: usize) -> Vec<ScenePrompt> {
    (0..n)
        .map(|i| ScenePrompt {
            display_text: format!("scene {}", i),
            generation_text: format!("job-{}", i),
            category: SceneCategory::PlainDisplay,
            aspect_ratio: AspectRatio::Square,
        })
        .collect()
}

async fn loaded_orchestrator(n: usize) -> Arc<Orchestrator> {
    let orch = Arc::new(Orchestrator::new());
    orch.load_registry(registry(n)).await;
    orch
}

// ── Exactly-once dispatch ───────────────────────────────────

#[tokio::test]
async fn test_exactly_once_dispatch_under_overlapping_runs() {
    let orch = loaded_orchestrator(6).await;
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::parallel())
        .with_delay(|_| Duration::from_millis(30)));
    let prod = product();

    // Re-entrant triggers: several runs overlap while jobs are in flight.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let orch = Arc::clone(&orch);
        let backend = Arc::clone(&backend) as Arc<dyn ImageBackend>;
        let prod = prod.clone();
        handles.push(tokio::spawn(async move {
            orch.run(backend, &prod).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(backend.calls(), 6, "each job submitted exactly once");
    assert_eq!(orch.ledger_len(), 6);
    assert!(orch.table().is_settled().await);
}

#[tokio::test]
async fn test_rerun_after_settlement_is_a_noop() {
    let orch = loaded_orchestrator(3).await;
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::parallel()));
    let prod = product();

    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &prod).await;
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &prod).await;

    assert_eq!(backend.calls(), 3);
}

// ── Forward-only state machine ──────────────────────────────

#[tokio::test]
async fn test_jobs_end_in_exactly_one_terminal_state() {
    let orch = loaded_orchestrator(4).await;
    let backend = Arc::new(ScriptedBackend::new(DispatchProfile::parallel(), |prompt| {
        if prompt == "job-2" {
            Err(BackendError::Refused("policy".into()))
        } else {
            Ok(Artifact::Url("https://img.example/ok.png".into()))
        }
    }));
    orch.run(backend as Arc<dyn ImageBackend>, &product()).await;

    let jobs = orch.table().snapshot().await;
    for job in &jobs {
        assert!(job.status.is_terminal(), "{} not terminal", job.id);
        match &job.status {
            JobStatus::Completed => assert!(job.artifact.is_some()),
            JobStatus::Failed(_) => assert!(job.artifact.is_none()),
            other => panic!("unexpected status {:?}", other),
        }
    }
    assert_eq!(jobs[2].status, JobStatus::Failed("generation refused by the model: policy".into()));
}

// ── Partial-failure isolation (serial) ──────────────────────

#[tokio::test]
async fn test_serial_failure_does_not_skip_successors() {
    let orch = loaded_orchestrator(3).await;
    let backend = Arc::new(ScriptedBackend::new(
        DispatchProfile::serial(Duration::from_millis(10)),
        |prompt| {
            if prompt == "job-1" {
                Err(BackendError::BadResponse("no image".into()))
            } else {
                Ok(Artifact::Url("https://img.example/ok.png".into()))
            }
        },
    ));
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    let jobs = orch.table().snapshot().await;
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert!(matches!(jobs[1].status, JobStatus::Failed(_)));
    assert_eq!(jobs[2].status, JobStatus::Completed);

    // Job 3 must have been attempted after job 2's failure, not skipped.
    let log = backend.log();
    assert_eq!(
        log.iter().map(|r| r.prompt.as_str()).collect::<Vec<_>>(),
        vec!["job-0", "job-1", "job-2"]
    );
}

// ── Serial pacing ───────────────────────────────────────────

#[tokio::test]
async fn test_serial_gap_floor_respected() {
    let gap = Duration::from_millis(80);
    let orch = loaded_orchestrator(3).await;
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::serial(gap)));
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    let log = backend.log();
    assert_eq!(log.len(), 3);
    for pair in log.windows(2) {
        let since_resolution = pair[1].started.duration_since(pair[0].resolved);
        assert!(
            since_resolution >= gap,
            "gap {:?} under the {:?} floor",
            since_resolution,
            gap
        );
    }
}

#[tokio::test]
async fn test_serial_completion_order_matches_submission_order() {
    let orch = loaded_orchestrator(4).await;
    let backend = Arc::new(
        ScriptedBackend::succeeding(DispatchProfile::serial(Duration::from_millis(5)))
            // First job slowest; order must still hold.
            .with_delay(|prompt| {
                if prompt == "job-0" {
                    Duration::from_millis(60)
                } else {
                    Duration::ZERO
                }
            }),
    );
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    let log = backend.log();
    let mut resolved: Vec<_> = log.iter().map(|r| (r.resolved, r.prompt.clone())).collect();
    resolved.sort();
    assert_eq!(
        resolved.iter().map(|(_, p)| p.as_str()).collect::<Vec<_>>(),
        vec!["job-0", "job-1", "job-2", "job-3"]
    );
}

// ── Parallel independence ───────────────────────────────────

#[tokio::test]
async fn test_parallel_jobs_unblocked_by_one_slow_call() {
    let orch = loaded_orchestrator(5).await;
    let backend = Arc::new(
        ScriptedBackend::succeeding(DispatchProfile::parallel()).with_delay(|prompt| {
            if prompt == "job-3" {
                Duration::from_millis(250)
            } else {
                Duration::from_millis(5)
            }
        }),
    );
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    let log = backend.log();
    assert_eq!(log.len(), 5);
    let slow = log.iter().find(|r| r.prompt == "job-3").unwrap();
    for record in log.iter().filter(|r| r.prompt != "job-3") {
        assert!(
            record.resolved < slow.resolved,
            "{} should resolve before the delayed job",
            record.prompt
        );
    }
    assert!(orch.table().is_settled().await);
}

// ── Empty registry guard ────────────────────────────────────

#[tokio::test]
async fn test_empty_registry_dispatches_nothing() {
    let orch = loaded_orchestrator(0).await;
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::parallel()));
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    assert_eq!(backend.calls(), 0);
    assert!(orch.table().is_empty().await);
    assert_eq!(orch.ledger_len(), 0);
}

// ── Transient exhaustion surfaces as failed, not retried here ─

#[tokio::test]
async fn test_transient_exhaustion_is_terminal_for_the_job() {
    let orch = loaded_orchestrator(2).await;
    let backend = Arc::new(ScriptedBackend::new(DispatchProfile::parallel(), |prompt| {
        if prompt == "job-0" {
            Err(BackendError::Transient("rate limited after retries".into()))
        } else {
            Ok(Artifact::Url("https://img.example/ok.png".into()))
        }
    }));
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;

    let jobs = orch.table().snapshot().await;
    assert!(matches!(jobs[0].status, JobStatus::Failed(_)));
    assert_eq!(jobs[1].status, JobStatus::Completed);
    // No orchestrator-level re-queue: one call per job, ever.
    assert_eq!(backend.calls(), 2);
}

// ── Reset ───────────────────────────────────────────────────

#[tokio::test]
async fn test_reset_clears_jobs_and_ledger() {
    let orch = loaded_orchestrator(3).await;
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::parallel()));
    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;
    assert_eq!(orch.ledger_len(), 3);

    orch.reset().await;
    assert!(orch.table().is_empty().await);
    assert_eq!(orch.ledger_len(), 0);

    // A fresh registry is independent of the prior session.
    orch.load_registry(registry(2)).await;
    let jobs = orch.table().snapshot().await;
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.status == JobStatus::Pending));

    orch.run(Arc::clone(&backend) as Arc<dyn ImageBackend>, &product()).await;
    assert_eq!(backend.calls(), 5, "3 from the first session, 2 after reset");
    assert!(orch.table().is_settled().await);
}

#[tokio::test]
async fn test_reset_mid_flight_discards_late_resolutions() {
    let orch = loaded_orchestrator(3).await;
    let backend = Arc::new(
        ScriptedBackend::succeeding(DispatchProfile::parallel())
            .with_delay(|_| Duration::from_millis(60)),
    );

    let runner = {
        let orch = Arc::clone(&orch);
        let backend = Arc::clone(&backend) as Arc<dyn ImageBackend>;
        let prod = product();
        tokio::spawn(async move {
            orch.run(backend, &prod).await;
        })
    };

    // Reset while all three calls are still in flight; their resolutions
    // land against an empty table and must be dropped, not panic.
    tokio::time::sleep(Duration::from_millis(20)).await;
    orch.reset().await;
    runner.await.unwrap();

    assert_eq!(backend.calls(), 3);
    assert!(orch.table().is_empty().await);
    assert_eq!(orch.ledger_len(), 0);
}

// ── Watch notifications ─────────────────────────────────────

#[tokio::test]
async fn test_presentation_layer_sees_every_phase() {
    let orch = loaded_orchestrator(1).await;
    let mut rx = orch.table().subscribe();
    let backend = Arc::new(ScriptedBackend::succeeding(DispatchProfile::parallel()));

    let observer = {
        let table = Arc::clone(orch.table());
        tokio::spawn(async move {
            let mut seen = Vec::new();
            loop {
                if rx.changed().await.is_err() {
                    break;
                }
                let snapshot = table.snapshot().await;
                if let Some(job) = snapshot.first() {
                    seen.push(job.status.clone());
                    if job.status.is_terminal() {
                        break;
                    }
                }
            }
            seen
        })
    };

    orch.run(backend as Arc<dyn ImageBackend>, &product()).await;
    let seen = observer.await.unwrap();

    // Whatever subset of updates the observer caught, it must be ordered
    // forward: no status may appear after a later one.
    let rank = |s: &JobStatus| match s {
        JobStatus::Pending => 0,
        JobStatus::InFlight => 1,
        JobStatus::Completed | JobStatus::Failed(_) => 2,
    };
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| rank(&w[0]) <= rank(&w[1])));
    assert!(seen.last().unwrap().is_terminal());
}
