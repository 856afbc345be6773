//! Configuration and resource locations.
//!
//! Runtime configuration lives in two plain directories: `config/` for the
//! JSON policy files (`models.json`, `content-types.json`) and `prompts/`
//! for the prompt-template text resources. Every consumer tolerates a
//! missing or corrupt file by falling back to embedded defaults — missing
//! config never crashes the pipeline.

use std::path::{Path, PathBuf};

/// Locations of the JSON config files and prompt resources.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Directory holding `models.json` and `content-types.json`.
    pub config_dir: PathBuf,
    /// Directory holding the prompt template text files.
    pub prompt_dir: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self { config_dir: resolve_dir("config"), prompt_dir: resolve_dir("prompts") }
    }
}

impl ConfigPaths {
    /// Both directories under one explicit root (`<root>/config`, `<root>/prompts`).
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self { config_dir: root.join("config"), prompt_dir: root.join("prompts") }
    }

    pub fn models_file(&self) -> PathBuf {
        self.config_dir.join("models.json")
    }

    pub fn content_types_file(&self) -> PathBuf {
        self.config_dir.join("content-types.json")
    }

    pub fn transform_prompt_file(&self) -> PathBuf {
        self.prompt_dir.join("transform-prompt.txt")
    }

    pub fn validation_prompt_file(&self) -> PathBuf {
        self.prompt_dir.join("content-validation-prompt.txt")
    }
}

/// Prefer a directory relative to the working directory; fall back to the
/// user-level config directory when the local one does not exist.
fn resolve_dir(name: &str) -> PathBuf {
    let local = PathBuf::from(name);
    if local.is_dir() {
        return local;
    }

    if let Some(base) = dirs::config_dir() {
        let user = base.join("distill").join(name);
        if user.is_dir() {
            return user;
        }
    }

    local
}

/// Whether the AI validation stage runs, from `ENABLE_AI_VALIDATION`.
/// Defaults to enabled when the variable is unset or unparsable.
pub fn ai_validation_enabled() -> bool {
    match std::env::var("ENABLE_AI_VALIDATION") {
        Ok(value) => value.to_lowercase() == "true",
        Err(_) => true,
    }
}

/// Cache TTL in seconds, from `CACHE_TTL`. Defaults to 24 hours.
pub fn cache_ttl_secs() -> u64 {
    std::env::var("CACHE_TTL").ok().and_then(|v| v.parse().ok()).unwrap_or(86_400)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_under_root() {
        let paths = ConfigPaths::under("/tmp/distill-test");
        assert_eq!(paths.models_file(), PathBuf::from("/tmp/distill-test/config/models.json"));
        assert_eq!(
            paths.validation_prompt_file(),
            PathBuf::from("/tmp/distill-test/prompts/content-validation-prompt.txt")
        );
    }
}
