//! Model backend registry, selection, and invocation.
//!
//! The manager owns the HTTP client and the path to `models.json`; the
//! profile table itself is static. Selection is deterministic: explicit
//! configured model first (only if its key is usable and it is enabled),
//! then the priority list, then — when nothing is usable — the head of
//! the priority list, so the resulting call fails with a meaningful
//! missing-key error instead of the selector crashing.

pub mod profile;
pub mod selection;
pub mod streaming;

use std::collections::HashMap;
use std::path::PathBuf;

use futures_util::StreamExt;
use serde::Serialize;
use serde_json::Value;

use crate::config::ConfigPaths;
use crate::{DistillError, Result};
pub use profile::{BUILTIN_PROFILES, ChatMessage, ModelProfile, WireFormat, find_profile};
pub use selection::{DEFAULT_PRIORITY, PLACEHOLDER_KEY, SelectionConfig, env_api_key, key_is_usable};
pub use streaming::SseAccumulator;

/// Catalog entry describing one backend's current usability.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub name: String,
    pub model: String,
    #[serde(rename = "hasValidKey")]
    pub has_valid_key: bool,
    #[serde(rename = "isEnabled")]
    pub is_enabled: bool,
    #[serde(rename = "isSelected")]
    pub is_selected: bool,
    #[serde(rename = "isCurrent")]
    pub is_current: bool,
}

/// Registry of model backends with selection and invocation.
#[derive(Debug, Clone)]
pub struct ModelManager {
    client: reqwest::Client,
    models_file: PathBuf,
}

impl ModelManager {
    pub fn new(paths: &ConfigPaths) -> Result<Self> {
        let client = reqwest::Client::builder().build().map_err(DistillError::Http)?;
        Ok(Self { client, models_file: paths.models_file() })
    }

    pub fn with_client(client: reqwest::Client, models_file: PathBuf) -> Self {
        Self { client, models_file }
    }

    pub fn is_valid_model(&self, model_id: &str) -> bool {
        find_profile(model_id).is_some()
    }

    pub fn profile(&self, model_id: &str) -> Result<&'static ModelProfile> {
        find_profile(model_id).ok_or_else(|| DistillError::UnknownModel(model_id.to_string()))
    }

    /// The API key the environment provides for `model_id`, if any.
    pub fn default_api_key(&self, model_id: &str) -> Option<String> {
        env_api_key(model_id)
    }

    /// Catalog of all backends with key/enabled/selection status, for
    /// operator-facing listings.
    pub fn available_models(&self) -> Vec<ModelStatus> {
        let config = SelectionConfig::load(&self.models_file);
        let current = self.select_best_model();
        BUILTIN_PROFILES
            .iter()
            .map(|p| ModelStatus {
                id: p.id.to_string(),
                name: p.display_name.to_string(),
                model: p.model.to_string(),
                has_valid_key: key_is_usable(env_api_key(p.id).as_deref()),
                is_enabled: config.is_enabled(p.id),
                is_selected: config.selected_model.as_deref() == Some(p.id),
                is_current: current == p.id,
            })
            .collect()
    }

    /// Selects the model to use, with keys resolved from the environment.
    pub fn select_best_model(&self) -> String {
        self.select_with_keys(&HashMap::new())
    }

    /// Selection with explicit key overrides (used by callers that manage
    /// keys themselves, and by tests). `models.json` is re-read on every
    /// call by design.
    pub fn select_with_keys(&self, key_overrides: &HashMap<String, String>) -> String {
        let config = SelectionConfig::load(&self.models_file);
        let resolve = |id: &str| -> Option<String> {
            key_overrides.get(id).cloned().or_else(|| env_api_key(id))
        };

        if let Some(selected) = config.selected_model.as_deref() {
            let key = resolve(selected);
            let usable = key_is_usable(key.as_deref());
            let enabled = config.is_enabled(selected);
            if usable && enabled && self.is_valid_model(selected) {
                tracing::info!(model = selected, "using configured model");
                return selected.to_string();
            }
            let reason = if !usable {
                "无可用API密钥"
            } else if !self.is_valid_model(selected) {
                "模型无效"
            } else {
                "模型未启用"
            };
            tracing::info!(model = selected, reason, "configured model unavailable, falling back to priority");
        }

        let priority = config.priority();
        for model_id in &priority {
            if key_is_usable(resolve(model_id).as_deref()) && config.is_enabled(model_id) {
                tracing::info!(model = %model_id, "selected model by priority");
                return model_id.clone();
            }
        }

        // Nothing usable: return the highest-priority entry so the caller's
        // invocation fails with a specific missing-key message.
        priority[0].clone()
    }

    /// Blocking invocation: one request, one full response body.
    pub async fn invoke(&self, model_id: &str, messages: &[ChatMessage], api_key: &str) -> Result<String> {
        let profile = self.profile(model_id)?;
        if api_key.is_empty() {
            return Err(DistillError::MissingApiKey(profile.display_name.to_string()));
        }

        let body =
            profile.wire_format.build_request(profile.model, messages, profile.max_tokens, profile.temperature, false);
        tracing::debug!(model = profile.id, endpoint = profile.endpoint, "invoking model");
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(profile.endpoint)
            .headers(profile.auth_headers(api_key))
            .timeout(profile.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_provider_error(&e, profile))?;

        let status = response.status();
        if !status.is_success() {
            return Err(provider_status_error(status.as_u16(), profile, response.text().await.ok()));
        }

        let parsed: Value = response.json().await.map_err(|e| DistillError::ProviderUnavailable {
            model: profile.display_name.to_string(),
            message: e.to_string(),
        })?;

        let text = profile.wire_format.extract_text(&parsed).ok_or_else(|| DistillError::ProviderUnavailable {
            model: profile.display_name.to_string(),
            message: "响应格式异常".to_string(),
        })?;

        tracing::info!(
            model = profile.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = text.chars().count(),
            "model call finished"
        );
        Ok(text)
    }

    /// Streaming invocation: deltas are delivered to `on_chunk` in order
    /// as they arrive; the returned string is their exact concatenation.
    pub async fn invoke_streaming<F>(
        &self, model_id: &str, messages: &[ChatMessage], api_key: &str, mut on_chunk: F,
    ) -> Result<String>
    where
        F: FnMut(&str),
    {
        let profile = self.profile(model_id)?;
        if api_key.is_empty() {
            return Err(DistillError::MissingApiKey(profile.display_name.to_string()));
        }

        let body =
            profile.wire_format.build_request(profile.model, messages, profile.max_tokens, profile.temperature, true);
        tracing::debug!(model = profile.id, endpoint = profile.endpoint, "invoking model (streaming)");
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(profile.endpoint)
            .headers(profile.auth_headers(api_key))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .timeout(profile.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_provider_error(&e, profile))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DistillError::StreamStatus { status: status.as_u16(), body });
        }

        let mut accumulator = SseAccumulator::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_provider_error(&e, profile))?;
            if let Some(full) = accumulator.push_bytes(&chunk, &mut on_chunk) {
                tracing::info!(
                    model = profile.id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response_chars = full.chars().count(),
                    "streaming call finished"
                );
                return Ok(full);
            }
        }

        let full = accumulator.finish()?;
        tracing::info!(
            model = profile.id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            response_chars = full.chars().count(),
            "streaming call finished without explicit terminator"
        );
        Ok(full)
    }
}

fn classify_provider_error(err: &reqwest::Error, profile: &ModelProfile) -> DistillError {
    if err.is_timeout() {
        return DistillError::ProviderTimeout {
            model: profile.display_name.to_string(),
            timeout_ms: profile.timeout.as_millis() as u64,
        };
    }
    if err.is_connect() {
        return DistillError::ProviderUnreachable { model: profile.display_name.to_string() };
    }
    DistillError::ProviderUnavailable { model: profile.display_name.to_string(), message: err.to_string() }
}

fn provider_status_error(status: u16, profile: &ModelProfile, body: Option<String>) -> DistillError {
    match status {
        401 => DistillError::InvalidApiKey { model: profile.display_name.to_string() },
        429 => DistillError::ProviderRateLimited { model: profile.display_name.to_string() },
        _ => DistillError::ProviderUnavailable {
            model: profile.display_name.to_string(),
            message: format!("HTTP {}{}", status, body.map(|b| format!(": {}", truncate(&b))).unwrap_or_default()),
        },
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(200).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn manager_with(models_json: Option<&str>) -> (ModelManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        if let Some(contents) = models_json {
            std::fs::write(&path, contents).unwrap();
        }
        let manager = ModelManager::with_client(reqwest::Client::new(), path);
        (manager, dir)
    }

    fn keys(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_priority_picks_first_usable_key() {
        let (manager, _dir) = manager_with(Some(r#"{"priority": ["grok3-mini", "groq-llama3", "qwen-turbo"]}"#));
        // Unusable placeholder entries pin the earlier models regardless of
        // whatever keys the test environment happens to export.
        let selected = manager.select_with_keys(&keys(&[
            ("grok3-mini", "test_key"),
            ("groq-llama3", "test_key"),
            ("qwen-turbo", "sk-qwen"),
        ]));
        assert_eq!(selected, "qwen-turbo");
    }

    #[test]
    fn test_override_without_key_loses_to_priority() {
        let (manager, _dir) = manager_with(Some(
            r#"{
                "priority": ["grok3-mini", "groq-llama3", "qwen-turbo"],
                "selectedModel": "grok3-mini"
            }"#,
        ));
        // The override points at A but only C has a usable key.
        let selected = manager.select_with_keys(&keys(&[
            ("grok3-mini", "test_key"),
            ("groq-llama3", "test_key"),
            ("qwen-turbo", "sk-qwen"),
        ]));
        assert_eq!(selected, "qwen-turbo");
    }

    #[test]
    fn test_override_with_key_wins() {
        let (manager, _dir) = manager_with(Some(r#"{"selectedModel": "openai-gpt4"}"#));
        let selected = manager.select_with_keys(&keys(&[("openai-gpt4", "sk-real"), ("grok3-mini", "sk-other")]));
        assert_eq!(selected, "openai-gpt4");
    }

    #[test]
    fn test_disabled_model_skipped() {
        let (manager, _dir) = manager_with(Some(
            r#"{
                "priority": ["grok3-mini", "groq-llama3"],
                "settings": {"grok3-mini": {"enabled": false}}
            }"#,
        ));
        let selected = manager.select_with_keys(&keys(&[("grok3-mini", "sk-a"), ("groq-llama3", "sk-b")]));
        assert_eq!(selected, "groq-llama3");
    }

    #[test]
    fn test_no_usable_key_degrades_to_priority_head() {
        let (manager, _dir) = manager_with(Some(r#"{"priority": ["qwen-max", "openai-gpt4"]}"#));
        let selected =
            manager.select_with_keys(&keys(&[("qwen-max", "test_key"), ("openai-gpt4", "test_key")]));
        assert_eq!(selected, "qwen-max");
    }

    #[tokio::test]
    async fn test_invoke_rejects_empty_key() {
        let manager = ModelManager::with_client(reqwest::Client::new(), Path::new("/none/models.json").into());
        let err = manager.invoke("openai-gpt4", &[ChatMessage::user("hi")], "").await.unwrap_err();
        assert!(matches!(err, DistillError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn test_invoke_unknown_model() {
        let manager = ModelManager::with_client(reqwest::Client::new(), Path::new("/none/models.json").into());
        let err = manager.invoke("nope", &[], "sk-x").await.unwrap_err();
        assert!(matches!(err, DistillError::UnknownModel(_)));
    }
}
