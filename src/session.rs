//! The four-stage studio workflow: intake → planning → scene selection →
//! generation. One session, one product; a full reset is the only way
//! back to the start.

use crate::catalog::ImageFetcher;
use crate::imagegen::{Artifact, ImageBackend};
use crate::orchestrator::{GenerationJob, JobId, JobStatus, JobTable, Orchestrator};
use crate::planning::{plan, PlanningModel, ScenePrompt};
use crate::product::ProductInput;
use anyhow::{anyhow, bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Planning,
    SceneSelection,
    Generating,
}

pub struct StudioSession {
    stage: Stage,
    product: Option<ProductInput>,
    analysis: Option<String>,
    proposed: Vec<ScenePrompt>,
    orchestrator: Arc<Orchestrator>,
}

impl StudioSession {
    pub fn new() -> Self {
        Self {
            stage: Stage::Upload,
            product: None,
            analysis: None,
            proposed: Vec::new(),
            orchestrator: Arc::new(Orchestrator::new()),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    /// Scene prompts proposed by planning, for the selection UI.
    pub fn proposed_scenes(&self) -> &[ScenePrompt] {
        &self.proposed
    }

    /// The observable job table, for the results UI.
    pub fn job_table(&self) -> &Arc<JobTable> {
        self.orchestrator.table()
    }

    pub async fn job_snapshot(&self) -> Vec<GenerationJob> {
        self.orchestrator.table().snapshot().await
    }

    // ── Stage transitions ──────────────────────────────

    /// Accept a validated product and move to planning.
    pub fn intake(&mut self, product: ProductInput) -> Result<()> {
        if self.stage != Stage::Upload {
            bail!("intake is only valid at the upload stage");
        }
        product.validate().context("product input rejected")?;
        info!(product = %product.name, "product accepted");
        self.product = Some(product);
        self.stage = Stage::Planning;
        Ok(())
    }

    /// Run analysis + scene proposal and move to scene selection.
    pub async fn plan(&mut self, model: &dyn PlanningModel) -> Result<()> {
        if self.stage != Stage::Planning {
            bail!("planning is only valid after intake");
        }
        let product = self
            .product
            .as_ref()
            .ok_or_else(|| anyhow!("no product on record"))?;
        let outcome = plan(model, product).await.context("planning failed")?;
        info!(scenes = outcome.prompts.len(), "planning complete");
        self.analysis = Some(outcome.analysis);
        self.proposed = outcome.prompts;
        self.stage = Stage::SceneSelection;
        Ok(())
    }

    /// Freeze the user's choice into the scene registry and build the job
    /// set. Out-of-range indices are ignored; selection order does not
    /// change registry order.
    pub async fn select_scenes(&mut self, indices: &[usize]) -> Result<usize> {
        if self.stage != Stage::SceneSelection {
            bail!("scene selection is only valid after planning");
        }
        let registry: Vec<ScenePrompt> = self
            .proposed
            .iter()
            .enumerate()
            .filter(|(i, _)| indices.contains(i))
            .map(|(_, p)| p.clone())
            .collect();
        let count = registry.len();
        self.orchestrator.load_registry(registry).await;
        self.stage = Stage::Generating;
        Ok(count)
    }

    /// Dispatch every selected scene against `backend` and drive the
    /// batch to completion. Failures land as per-job status, never as an
    /// error from this call.
    pub async fn generate(&self, backend: Arc<dyn ImageBackend>) -> Result<()> {
        if self.stage != Stage::Generating {
            bail!("generation is only valid after scene selection");
        }
        let product = self
            .product
            .as_ref()
            .ok_or_else(|| anyhow!("no product on record"))?;
        self.orchestrator.run(backend, product).await;
        Ok(())
    }

    /// Discard everything and return to the upload stage.
    pub async fn reset(&mut self) {
        self.orchestrator.reset().await;
        self.product = None;
        self.analysis = None;
        self.proposed.clear();
        self.stage = Stage::Upload;
        info!("session reset");
    }

    // ── Artifact export ────────────────────────────────

    /// Write one completed job's image to `dir`, returning the file path.
    /// Only `Completed` jobs can be exported; URL artifacts are fetched
    /// first.
    pub async fn export_artifact(&self, id: JobId, dir: &Path) -> Result<PathBuf> {
        let jobs = self.job_snapshot().await;
        let job = jobs
            .iter()
            .find(|j| j.id == id)
            .ok_or_else(|| anyhow!("no job {}", id))?;

        if job.status != JobStatus::Completed {
            bail!("job {} is not completed, nothing to export", id);
        }
        let artifact = job
            .artifact
            .as_ref()
            .ok_or_else(|| anyhow!("completed job {} has no artifact", id))?;

        let (bytes, mime) = match artifact {
            Artifact::Inline { mime, data } => (data.clone(), mime.clone()),
            Artifact::Url(url) => {
                let blob = ImageFetcher::new(None, None)
                    .fetch_artifact(url)
                    .await
                    .context("failed to fetch remote artifact")?;
                (blob.data, blob.mime)
            }
        };

        let ext = match mime.as_str() {
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "png",
        };
        let filename = format!(
            "generated-product-{}_{}_{}.{}",
            id,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            uuid::Uuid::new_v4(),
            ext
        );
        let path = dir.join(filename);
        std::fs::create_dir_all(dir).context("failed to create export directory")?;
        std::fs::write(&path, bytes).context("failed to write artifact")?;
        info!(job = %id, path = %path.display(), "artifact exported");
        Ok(path)
    }
}

impl Default for StudioSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Default export location: the user's download directory, falling back
/// to the current directory.
pub fn default_export_dir() -> PathBuf {
    dirs_next::download_dir().unwrap_or_else(|| PathBuf::from("."))
}
