//! Parallel-capable backend: Gemini-style `generateContent` image editing.
//!
//! Tolerates many simultaneous in-flight calls; rate-limit and server
//! faults are retried internally with exponential backoff before anything
//! surfaces to the orchestrator.

use crate::imagegen::interface::{
    Artifact, BackendError, DispatchProfile, GenerationRequest, ImageBackend,
};
use crate::utils::http::{send_with_retry, RetryPolicy};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash-image";

pub struct GeminiBackend {
    id: String,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
    client: Client,
}

impl GeminiBackend {
    pub fn new(
        id: String,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            id,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            retry: RetryPolicy::default(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .no_proxy()
                .build()
                .unwrap_or_default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        )
    }

    fn build_body(&self, request: &GenerationRequest) -> Value {
        let instruction = format!(
            "Generate a high-quality product photograph.\n\n\
             Input: Use the provided product image.\n\
             Scene: {}\n\
             Target aspect ratio: {}\n\n\
             Instructions:\n\
             1. Place the product naturally into the described scene.\n\
             2. Ensure realistic lighting, shadows, and reflections.\n\
             3. Do not alter the product's appearance, only its environment.\n\
             4. Any text appearing in the background must be written in {}.\n\
             5. Output ONLY the generated image.",
            request.prompt,
            request.aspect_ratio.label(),
            request.language.english_name(),
        );

        json!({
            "contents": {
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": request.image.mime,
                            "data": request.image.to_base64(),
                        }
                    },
                    { "text": instruction }
                ]
            }
        })
    }

    /// Pull the generated image out of a candidate, or classify why there
    /// is none. A text part instead of an image is a model refusal.
    fn extract_artifact(json: &Value) -> Result<Artifact, BackendError> {
        let parts = json
            .pointer("/candidates/0/content/parts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                // A SAFETY finish reason arrives with no content at all.
                if json.pointer("/candidates/0/finishReason").and_then(|v| v.as_str())
                    == Some("SAFETY")
                {
                    BackendError::Refused("safety filter triggered".to_string())
                } else {
                    BackendError::BadResponse("missing candidates[0].content.parts".to_string())
                }
            })?;

        for part in parts {
            if let Some(data) = part.pointer("/inlineData/data").and_then(|v| v.as_str()) {
                let mime = part
                    .pointer("/inlineData/mimeType")
                    .and_then(|v| v.as_str())
                    .unwrap_or("image/png")
                    .to_string();
                let bytes = general_purpose::STANDARD.decode(data).map_err(|e| {
                    BackendError::BadResponse(format!("base64 decode failed: {}", e))
                })?;
                return Ok(Artifact::Inline { mime, data: bytes });
            }
        }

        // No image part: a text part is the model declining in prose.
        for part in parts {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                return Err(BackendError::Refused(format!(
                    "model returned text instead of an image: {}",
                    text
                )));
            }
        }

        Err(BackendError::BadResponse(
            "no image data found in response".to_string(),
        ))
    }
}

#[async_trait]
impl ImageBackend for GeminiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn profile(&self) -> DispatchProfile {
        DispatchProfile::parallel()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Config("API key is not set".to_string()));
        }

        let url = self.endpoint();
        let body = self.build_body(request);

        let client = self.client.clone();
        let res = send_with_retry(&self.retry, || {
            let client = client.clone();
            let url = url.clone();
            let body = body.clone();
            async move { client.post(&url).json(&body).send().await }
        })
        .await
        .map_err(BackendError::Transient)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            // Retryable statuses landing here mean the retry ceiling was hit.
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(BackendError::Transient(format!(
                    "upstream kept rejecting ({}): {}",
                    status, text
                )));
            }
            return Err(BackendError::Config(format!(
                "API error {}: {}",
                status, text
            )));
        }

        let json: Value = res
            .json()
            .await
            .map_err(|e| BackendError::BadResponse(format!("invalid JSON: {}", e)))?;

        Self::extract_artifact(&json)
    }
}
