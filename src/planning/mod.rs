//! Visual analysis and scene planning: one vision-language pass over the
//! product image, then a batch of scene prompts per enabled generation
//! config. The output registry is immutable downstream.

pub mod gemini;

pub use gemini::GeminiPlanner;

use crate::product::{AspectRatio, GenerationConfig, ProductInput, SceneCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

// ── Scene prompt ───────────────────────────────────────

/// One planned output image: human-facing description, machine-facing
/// generation prompt, and the shape it should be rendered at. Never
/// mutated after planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenePrompt {
    /// Shown to the user in their language.
    pub display_text: String,
    /// Sent to the image model, always English, never names the product.
    pub generation_text: String,
    pub category: SceneCategory,
    pub aspect_ratio: AspectRatio,
}

// ── Planning model ─────────────────────────────────────

#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("planning request failed: {0}")]
    Network(String),
    #[error("unexpected planning response: {0}")]
    BadResponse(String),
}

/// Vision-language collaborator producing the analysis summary and the
/// scene prompt candidates.
#[async_trait]
pub trait PlanningModel: Send + Sync {
    /// Describe the product photo from a visual-marketing angle, in the
    /// product's target language.
    async fn analyze_product(&self, product: &ProductInput) -> Result<String, PlanningError>;

    /// Propose `config.count` scene prompts for one generation config.
    async fn propose_scenes(
        &self,
        product: &ProductInput,
        analysis: &str,
        config: &GenerationConfig,
    ) -> Result<Vec<ScenePrompt>, PlanningError>;
}

// ── Pipeline ───────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub analysis: String,
    pub prompts: Vec<ScenePrompt>,
}

/// Canned prompts substituted when scene proposal fails, so the user can
/// still proceed to generation. Cycled to fill `config.count` slots.
pub fn fallback_scenes(config: &GenerationConfig) -> Vec<ScenePrompt> {
    let templates = [
        (
            "Minimalist marble podium with soft morning sunlight.",
            "The product placed on a minimalist marble podium with soft morning sunlight.",
        ),
        (
            "Cozy lifestyle setting with a warm blurred background.",
            "The product sitting in a cozy lifestyle setting with warm blurred background.",
        ),
    ];
    (0..config.count.max(1))
        .map(|i| {
            let (display, generation) = templates[i % templates.len()];
            ScenePrompt {
                display_text: display.to_string(),
                generation_text: generation.to_string(),
                category: config.category,
                aspect_ratio: config.aspect_ratio,
            }
        })
        .collect()
}

/// Run the full planning pass: analysis first, then one proposal call per
/// enabled config. A failed or empty proposal falls back to the canned
/// set, so every enabled config contributes prompts; an analysis failure
/// aborts the pipeline.
pub async fn plan(
    model: &dyn PlanningModel,
    product: &ProductInput,
) -> Result<PlanOutcome, PlanningError> {
    let analysis = model.analyze_product(product).await?;

    let mut prompts = Vec::new();
    for config in product.enabled_configs() {
        match model.propose_scenes(product, &analysis, config).await {
            Ok(batch) if !batch.is_empty() => prompts.extend(batch),
            Ok(_) => {
                warn!(category = ?config.category, "planner proposed zero scenes, using fallback");
                prompts.extend(fallback_scenes(config));
            }
            Err(e) => {
                warn!(category = ?config.category, error = %e, "scene proposal failed, using fallback");
                prompts.extend(fallback_scenes(config));
            }
        }
    }

    Ok(PlanOutcome { analysis, prompts })
}
