//! Serial-only backend: Qwen image editing behind a relay endpoint.
//!
//! The upstream quota is tight enough that retry alone cannot absorb it,
//! so the profile demands serialized submission with a minimum gap between
//! calls. Result URLs are re-wrapped through the relay so the presentation
//! layer can actually fetch them.

use crate::imagegen::interface::{
    Artifact, BackendError, DispatchProfile, GenerationRequest, ImageBackend,
};
use crate::product::TargetLanguage;
use crate::utils::http::{send_with_retry, RetryPolicy};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use std::time::Duration;

const DEFAULT_MODEL: &str = "qwen-image-edit-plus";
const MIN_REQUEST_GAP: Duration = Duration::from_millis(500);

pub struct QwenBackend {
    id: String,
    api_key: String,
    relay_url: String,
    model: String,
    retry: RetryPolicy,
    client: Client,
}

/// Language constraint injected into the prompt, plus the scripts to push
/// into the negative prompt so the model does not mix alphabets.
fn language_rules(language: TargetLanguage) -> (&'static str, &'static str) {
    match language {
        TargetLanguage::Ru => (
            "IMPORTANT: Any text or labels generated in the background MUST be in RUSSIAN (Cyrillic).",
            "English text, latin characters, chinese characters, ",
        ),
        TargetLanguage::Zh => (
            "IMPORTANT: Any text generated MUST be in SIMPLIFIED CHINESE.",
            "English text, latin characters, russian characters, ",
        ),
        TargetLanguage::En => ("Text should be in English.", ""),
    }
}

/// Drop HTML tags and collapse whitespace, keeping only readable text.
fn strip_tags(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_tag = false;
    for c in raw.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl QwenBackend {
    pub fn new(id: String, api_key: String, relay_url: String, model: Option<String>) -> Self {
        Self {
            id,
            api_key,
            relay_url,
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

    fn build_body(&self, request: &GenerationRequest) -> Value {
        let (lang_rule, negative_lang) = language_rules(request.language);

        let prompt = format!(
            "Task: E-commerce Product Background Replacement / Scene Generation.\n\
             input_image: The provided image contains the REFERENCE PRODUCT.\n\n\
             Strict Rules:\n\
             1. KEEP the product subject EXACTLY as it is. Do NOT change logos, text, buttons, or colors on the product.\n\
             2. The product must be placed logically (on a surface, not floating randomly).\n\
             3. LANGUAGE CONSTRAINT: {}\n\
             4. Target aspect ratio: {}.\n\
             5. Generate the background based on this description: {}",
            lang_rule,
            request.aspect_ratio.label(),
            request.prompt,
        );

        let negative_prompt = format!(
            "{}text on product, wrong logo, altered product details, distorted, low quality, \
             bad composition, watermark, messy background, floating objects, defying gravity, blurry",
            negative_lang
        );

        json!({
            "model": self.model,
            "input": {
                "messages": [{
                    "role": "user",
                    "content": [
                        { "image": request.image.to_data_url() },
                        { "text": prompt }
                    ]
                }]
            },
            "parameters": {
                "n": 1,
                "negative_prompt": negative_prompt,
                "prompt_extend": true,
                "watermark": false
            }
        })
    }

    /// Wrap an upstream result URL through the relay, which strips the
    /// CORS and signed-URL restrictions the raw bucket URL carries.
    fn wrap_result_url(&self, upstream: &str) -> Result<String, BackendError> {
        Url::parse_with_params(&self.relay_url, &[("url", upstream)])
            .map(|u| u.to_string())
            .map_err(|e| BackendError::Config(format!("bad relay URL: {}", e)))
    }

    fn parse_response(&self, text: &str) -> Result<Artifact, BackendError> {
        let data: Value = serde_json::from_str(text).map_err(|_| {
            // Non-JSON output means the relay itself blew up (HTML error
            // page). Strip tags so the message is readable.
            let snippet: String = strip_tags(text).chars().take(300).collect();
            if snippet.contains("Fatal error") {
                BackendError::Config(format!("relay script error: {}", snippet))
            } else {
                BackendError::BadResponse(format!("relay returned non-JSON: {}", snippet))
            }
        })?;

        if let Some(err) = data.get("error") {
            let msg = data
                .get("message")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| err.to_string());
            return Err(BackendError::BadResponse(format!("relay error: {}", msg)));
        }

        // Upstream business-level errors arrive as a non-empty `code`.
        if let Some(code) = data.get("code").and_then(|v| v.as_str()) {
            if !code.is_empty() {
                let msg = data.get("message").and_then(|v| v.as_str()).unwrap_or("");
                return Err(BackendError::BadResponse(format!(
                    "upstream error {}: {}",
                    code, msg
                )));
            }
        }

        let content = data
            .pointer("/output/choices/0/message/content")
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                BackendError::BadResponse("missing output.choices[0].message.content".to_string())
            })?;

        for item in content {
            if let Some(url) = item.get("image").and_then(|v| v.as_str()) {
                return Ok(Artifact::Url(self.wrap_result_url(url)?));
            }
        }

        Err(BackendError::BadResponse(
            "no image found in response".to_string(),
        ))
    }
}

#[async_trait]
impl ImageBackend for QwenBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn profile(&self) -> DispatchProfile {
        DispatchProfile::serial(MIN_REQUEST_GAP)
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Artifact, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Config("API key is not set".to_string()));
        }

        let body = self.build_body(request);
        let client = self.client.clone();
        let url = self.relay_url.clone();
        let api_key = self.api_key.clone();

        let res = send_with_retry(&self.retry, || {
            let client = client.clone();
            let url = url.clone();
            let api_key = api_key.clone();
            let body = body.clone();
            async move {
                client
                    .post(&url)
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await
            }
        })
        .await
        .map_err(BackendError::Transient)?;

        let status = res.status();
        let text = res.text().await.unwrap_or_default();

        if !status.is_success() {
            if status.as_u16() == 429 || status.is_server_error() {
                return Err(BackendError::Transient(format!(
                    "upstream kept rejecting ({})",
                    status
                )));
            }
            let snippet: String = text.chars().take(200).collect();
            return Err(BackendError::BadResponse(format!(
                "API error {}: {}",
                status, snippet
            )));
        }

        self.parse_response(&text)
    }
}
