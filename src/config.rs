//! Shared config utilities: JSON config file load/save and API-key
//! resolution from config fields or environment variables.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Load any Serde config type with a `Default` implementation from a JSON
/// file. Falls back to `T::default()` if the file is missing or unparsable
/// so a broken config never prevents startup.
pub fn load_json_config<T: DeserializeOwned + Default>(path: &Path, label: &str) -> T {
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<T>(&content) {
            Ok(config) => {
                info!(label, path = %path.display(), "loaded config");
                config
            }
            Err(e) => {
                warn!(label, path = %path.display(), error = %e, "unparsable config, using defaults");
                T::default()
            }
        },
        Err(_) => {
            info!(label, path = %path.display(), "no config file, using defaults");
            T::default()
        }
    }
}

/// Save any Serde config type as pretty-printed JSON, creating parent
/// directories as needed.
pub fn save_json_config<T: Serialize>(path: &Path, config: &T, label: &str) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;
    info!(label, path = %path.display(), "saved config");
    Ok(())
}

/// Resolve an API key: the direct `api_key` field wins, then the
/// environment variable named in `api_key_env`. Empty strings count as
/// unset in both places.
pub fn resolve_api_key(api_key: &Option<String>, api_key_env: &Option<String>) -> Option<String> {
    if let Some(key) = api_key {
        if !key.is_empty() {
            return Some(key.clone());
        }
    }
    if let Some(env_var) = api_key_env {
        if let Ok(key) = std::env::var(env_var) {
            if !key.is_empty() {
                return Some(key);
            }
        }
    }
    None
}
