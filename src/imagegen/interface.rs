use crate::planning::ScenePrompt;
use crate::product::{AspectRatio, ImageBlob, ProductInput, TargetLanguage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ── Error types ────────────────────────────────────────

/// Outcome classification for one generation call.
///
/// `Transient` is what the adapter's internal retry loop failed to absorb
/// within its attempt ceiling; everything else is terminal on first sight.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("transient backend fault: {0}")]
    Transient(String),
    #[error("generation refused by the model: {0}")]
    Refused(String),
    #[error("unexpected response shape: {0}")]
    BadResponse(String),
    #[error("backend configuration error: {0}")]
    Config(String),
}

impl BackendError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

// ── Dispatch capability descriptor ─────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Any number of simultaneous in-flight calls is fine.
    Unbounded,
    /// The caller must submit one call at a time.
    Serial,
}

/// What the orchestrator is allowed to do to this backend. Read
/// generically so new backends need no orchestrator changes.
#[derive(Debug, Clone, Copy)]
pub struct DispatchProfile {
    pub concurrency: Concurrency,
    /// Minimum wait between one call's resolution and the next submission.
    /// Only meaningful for `Serial` backends.
    pub min_request_gap: Duration,
}

impl DispatchProfile {
    pub fn parallel() -> Self {
        Self {
            concurrency: Concurrency::Unbounded,
            min_request_gap: Duration::ZERO,
        }
    }

    pub fn serial(min_request_gap: Duration) -> Self {
        Self {
            concurrency: Concurrency::Serial,
            min_request_gap,
        }
    }
}

// ── Request / artifact ─────────────────────────────────

/// Everything one generation call needs. The image blob is shared across
/// all jobs of a batch.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub image: Arc<ImageBlob>,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub language: TargetLanguage,
    pub product_name: String,
    pub selling_points: String,
}

impl GenerationRequest {
    pub fn new(product: &ProductInput, image: Arc<ImageBlob>, scene: &ScenePrompt) -> Self {
        Self {
            image,
            prompt: scene.generation_text.clone(),
            aspect_ratio: scene.aspect_ratio,
            language: product.target_language,
            product_name: product.name.clone(),
            selling_points: product.selling_points.clone(),
        }
    }
}

/// Opaque locator for one generated image, renderable by the presentation
/// layer and exportable on user request.
#[derive(Debug, Clone)]
pub enum Artifact {
    /// Remote image URL (already wrapped for fetchability where needed).
    Url(String),
    /// Image bytes delivered inline by the model.
    Inline { mime: String, data: Vec<u8> },
}

impl Artifact {
    /// Browser-renderable reference: the URL itself, or a data URL for
    /// inline payloads.
    pub fn render_url(&self) -> String {
        match self {
            Artifact::Url(url) => url.clone(),
            Artifact::Inline { mime, data } => {
                use base64::{engine::general_purpose, Engine as _};
                format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(data))
            }
        }
    }
}

// ── Backend trait ──────────────────────────────────────

/// One external image-generation endpoint. Performs exactly one call per
/// `generate` invocation (plus its own transient-error retries), mutates
/// nothing outside itself, and classifies the outcome.
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Stable identifier, e.g. `"gemini"` or `"qwen"`.
    fn id(&self) -> &str;

    /// Concurrency constraint the caller must honor.
    fn profile(&self) -> DispatchProfile;

    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, BackendError>;
}
