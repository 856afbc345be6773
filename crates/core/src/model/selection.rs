//! Model selection configuration and API key resolution.
//!
//! `models.json` is read fresh on every selection call so an operator can
//! repoint the service without a restart. Keys come from per-backend
//! environment variables with a global OpenAI fallback; the placeholder
//! value `test_key` counts as absent so misconfigured environments fail
//! over instead of making doomed calls.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use super::profile::find_profile;

/// Placeholder key value treated as "no key configured".
pub const PLACEHOLDER_KEY: &str = "test_key";

/// Fallback priority when `models.json` is missing or lacks one.
pub const DEFAULT_PRIORITY: &[&str] = &["grok3-mini", "groq-llama3", "qwen-turbo", "openai-gpt4", "qwen-max"];

/// Per-model toggle in `models.json`. Enabled unless explicitly disabled.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// On-disk shape of `models.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectionConfig {
    #[serde(default)]
    pub priority: Vec<String>,
    #[serde(rename = "selectedModel", default)]
    pub selected_model: Option<String>,
    #[serde(default)]
    pub settings: HashMap<String, ModelSettings>,
}

impl SelectionConfig {
    /// Loads the file, falling back to defaults when missing or corrupt.
    /// Deliberately not cached: each selection call sees current contents.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "invalid models.json, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// The configured priority list, or the built-in default order.
    pub fn priority(&self) -> Vec<String> {
        if self.priority.is_empty() {
            DEFAULT_PRIORITY.iter().map(|id| id.to_string()).collect()
        } else {
            self.priority.clone()
        }
    }

    /// A model is enabled unless its settings entry says otherwise.
    pub fn is_enabled(&self, model_id: &str) -> bool {
        self.settings.get(model_id).map(|s| s.enabled).unwrap_or(true)
    }
}

/// Resolves the API key for `model_id` from the environment: the
/// backend's own variables in order, then `OPENAI_API_KEY` as the global
/// fallback.
pub fn env_api_key(model_id: &str) -> Option<String> {
    if let Some(profile) = find_profile(model_id) {
        for var in profile.env_keys {
            if let Some(value) = non_empty_env(var) {
                return Some(value);
            }
        }
    }
    non_empty_env("OPENAI_API_KEY")
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// A key is usable when present and not the placeholder sentinel.
pub fn key_is_usable(key: Option<&str>) -> bool {
    matches!(key, Some(k) if !k.is_empty() && k != PLACEHOLDER_KEY)
}
