//! Gemini-backed planning model: multimodal analysis plus structured-JSON
//! scene proposal.

use crate::planning::{PlanningError, PlanningModel, ScenePrompt};
use crate::product::{GenerationConfig, ProductInput, SceneCategory};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

pub struct GeminiPlanner {
    api_key: String,
    base_url: String,
    model: String,
    client: Client,
}

/// Shape the structured-output schema asks the model for.
#[derive(Debug, Deserialize)]
struct ProposedScene {
    display: String,
    generation: String,
}

impl GeminiPlanner {
    pub fn new(api_key: String, base_url: Option<String>, model: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .no_proxy()
                .build()
                .unwrap_or_default(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    async fn generate_content(&self, body: Value) -> Result<Value, PlanningError> {
        let res = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| PlanningError::Network(e.to_string()))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(PlanningError::Network(format!(
                "API error {}: {}",
                status, text
            )));
        }

        res.json()
            .await
            .map_err(|e| PlanningError::BadResponse(format!("invalid JSON: {}", e)))
    }

    fn first_text(json: &Value) -> Result<&str, PlanningError> {
        json.pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlanningError::BadResponse("missing text part".to_string()))
    }

    fn category_brief(category: SceneCategory) -> &'static str {
        match category {
            SceneCategory::PlainDisplay => {
                "pure environment shots: background, lighting and atmosphere only, no overlaid copy"
            }
            SceneCategory::FeatureCallout => {
                "selling-point callout compositions that leave clean space for short marketing copy"
            }
            SceneCategory::StructuredBreakdown => {
                "tall detail-page panels walking through the product's strengths section by section"
            }
        }
    }
}

#[async_trait]
impl PlanningModel for GeminiPlanner {
    async fn analyze_product(&self, product: &ProductInput) -> Result<String, PlanningError> {
        let prompt = format!(
            "Analyze this product photo from an e-commerce visual-marketing angle.\n\
             Product name: {}\n\
             Selling points: {}\n\n\
             Give a concise visual description focusing on material, color, \
             lighting needs and perspective. Respond in {}.",
            product.name,
            product.selling_points,
            product.target_language.english_name(),
        );

        let body = json!({
            "contents": {
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": product.image.mime,
                            "data": product.image.to_base64(),
                        }
                    },
                    { "text": prompt }
                ]
            }
        });

        let json = self.generate_content(body).await?;
        Ok(Self::first_text(&json)?.to_string())
    }

    async fn propose_scenes(
        &self,
        product: &ProductInput,
        analysis: &str,
        config: &GenerationConfig,
    ) -> Result<Vec<ScenePrompt>, PlanningError> {
        let prompt = format!(
            "You are a senior e-commerce photography art director.\n\n\
             Product: {}\n\
             Selling points: {}\n\
             Visual analysis: {}\n\n\
             Devise {} distinct scene prompts to showcase this product as {}.\n\
             Each scene should highlight the selling points and suit a premium \
             marketing campaign. Describe background, light and atmosphere; \
             avoid people so the product stays in focus.\n\n\
             Requirements:\n\
             1. `generation` is the English prompt for the image model. Never \
             name the product; refer to it as \"the product\" or \"the item\".\n\
             2. `display` is the matching description for the user, written in {}.",
            product.name,
            product.selling_points,
            analysis,
            config.count,
            Self::category_brief(config.category),
            product.target_language.english_name(),
        );

        let body = json!({
            "contents": { "parts": [ { "text": prompt } ] },
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "ARRAY",
                    "items": {
                        "type": "OBJECT",
                        "properties": {
                            "display": { "type": "STRING", "description": "Scene description for the user" },
                            "generation": { "type": "STRING", "description": "Prompt in English for generation" }
                        },
                        "required": ["display", "generation"]
                    }
                }
            }
        });

        let json = self.generate_content(body).await?;
        let text = Self::first_text(&json)?;
        let proposed: Vec<ProposedScene> = serde_json::from_str(text)
            .map_err(|e| PlanningError::BadResponse(format!("scene JSON: {}", e)))?;

        Ok(proposed
            .into_iter()
            .map(|s| ScenePrompt {
                display_text: s.display,
                generation_text: s.generation,
                category: config.category,
                aspect_ratio: config.aspect_ratio,
            })
            .collect())
    }
}
