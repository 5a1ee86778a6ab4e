use crate::imagegen::interface::ImageBackend;
use crate::imagegen::{GeminiBackend, QwenBackend};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

// ── Backend config ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: String,
    /// `"gemini"` or `"qwen"`.
    pub kind: String,
    #[serde(default = "default_true")]
    pub enabled: bool,

    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    /// Direct API base for Gemini-style backends.
    pub base_url: Option<String>,
    /// Relay endpoint for backends fronted by one.
    pub relay_url: Option<String>,
    pub model: Option<String>,
}

impl BackendConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        crate::config::resolve_api_key(&self.api_key, &self.api_key_env)
    }
}

fn default_true() -> bool {
    true
}

// ── System config ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSystemConfig {
    #[serde(default)]
    pub default_backend: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

impl Default for BackendSystemConfig {
    fn default() -> Self {
        Self {
            default_backend: Some("gemini".to_string()),
            enabled: true,
            backends: vec![
                BackendConfig {
                    id: "gemini".to_string(),
                    kind: "gemini".to_string(),
                    enabled: true,
                    api_key: None,
                    api_key_env: Some("GEMINI_API_KEY".to_string()),
                    base_url: None,
                    relay_url: None,
                    model: None,
                },
                BackendConfig {
                    id: "qwen".to_string(),
                    kind: "qwen".to_string(),
                    enabled: false,
                    api_key: None,
                    api_key_env: Some("DASHSCOPE_API_KEY".to_string()),
                    base_url: None,
                    relay_url: None,
                    model: None,
                },
            ],
        }
    }
}

/// Build a boxed backend from its config entry. Returns `None` when the
/// entry is unusable (unknown kind, missing key or relay URL).
pub fn build_backend(config: &BackendConfig) -> Option<Box<dyn ImageBackend>> {
    match config.kind.as_str() {
        "gemini" => {
            let api_key = config.resolve_api_key()?;
            Some(Box::new(GeminiBackend::new(
                config.id.clone(),
                api_key,
                config.base_url.clone(),
                config.model.clone(),
            )))
        }
        "qwen" => {
            let api_key = config.resolve_api_key()?;
            let relay_url = config.relay_url.clone()?;
            Some(Box::new(QwenBackend::new(
                config.id.clone(),
                api_key,
                relay_url,
                config.model.clone(),
            )))
        }
        other => {
            warn!(kind = other, id = %config.id, "unknown backend kind");
            None
        }
    }
}

/// Load the backend system config from a JSON file, defaulting when the
/// file is absent or broken.
pub fn load_config(path: &Path) -> BackendSystemConfig {
    crate::config::load_json_config(path, "ImageGen")
}

pub fn save_config(path: &Path, config: &BackendSystemConfig) -> Result<(), String> {
    crate::config::save_json_config(path, config, "ImageGen")
}
