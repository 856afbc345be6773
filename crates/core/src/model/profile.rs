//! Static model backend profiles and wire formats.
//!
//! The registry is a fixed table constructed once and never mutated.
//! Backends speak one of two wire protocols: the OpenAI-style chat
//! completions shape, or the DashScope vendor envelope with its nested
//! `input`/`parameters` objects. Dispatch is by the profile's declared
//! format tag — no runtime shape-sniffing outside the streaming parser.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One chat message in a model request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// The request/response shape a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    /// OpenAI-style `{model, messages, max_tokens, temperature}` with a
    /// top-level `stream` flag.
    StandardChat,
    /// DashScope envelope: `{model, input: {messages}, parameters: {...}}`
    /// with the stream flag nested under `parameters`.
    VendorEnvelope,
}

impl WireFormat {
    /// Builds the request body for this format. `stream` places the flag
    /// in the format-appropriate location.
    pub fn build_request(
        &self, model: &str, messages: &[ChatMessage], max_tokens: u32, temperature: f32, stream: bool,
    ) -> Value {
        match self {
            WireFormat::StandardChat => {
                let mut body = json!({
                    "model": model,
                    "messages": messages,
                    "max_tokens": max_tokens,
                    "temperature": temperature,
                });
                if stream {
                    body["stream"] = json!(true);
                }
                body
            }
            WireFormat::VendorEnvelope => {
                let mut parameters = json!({
                    "max_tokens": max_tokens,
                    "temperature": temperature,
                    "top_p": 0.8,
                    "incremental_output": true,
                });
                if stream {
                    parameters["stream"] = json!(true);
                }
                json!({
                    "model": model,
                    "input": { "messages": messages },
                    "parameters": parameters,
                })
            }
        }
    }

    /// Pulls the text payload out of a blocking response body.
    pub fn extract_text(&self, response: &Value) -> Option<String> {
        let text = match self {
            WireFormat::StandardChat => {
                response.get("choices")?.get(0)?.get("message")?.get("content")?.as_str()?
            }
            WireFormat::VendorEnvelope => response.get("output")?.get("text")?.as_str()?,
        };
        Some(text.trim().to_string())
    }
}

/// Static descriptor of one LLM backend.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub id: &'static str,
    pub display_name: &'static str,
    pub endpoint: &'static str,
    pub model: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    pub supports_streaming: bool,
    pub wire_format: WireFormat,
    /// Environment variables checked in order for this backend's API key.
    pub env_keys: &'static [&'static str],
}

impl ModelProfile {
    /// Request headers for this backend. All current backends use Bearer
    /// auth; profiles own this so a future backend can differ.
    pub fn auth_headers(&self, api_key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", api_key)) {
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }
}

/// The built-in backend registry, in no particular order; selection order
/// comes from the priority list.
pub const BUILTIN_PROFILES: &[ModelProfile] = &[
    ModelProfile {
        id: "grok3-mini",
        display_name: "Grok 3 Mini",
        endpoint: "https://api.x.ai/v1/chat/completions",
        model: "grok-3-mini",
        max_tokens: 9999,
        temperature: 0.7,
        timeout: Duration::from_millis(30_000),
        supports_streaming: true,
        wire_format: WireFormat::StandardChat,
        env_keys: &["XAI_API_KEY"],
    },
    ModelProfile {
        id: "groq-llama3",
        display_name: "Groq Llama3",
        endpoint: "https://api.groq.com/openai/v1/chat/completions",
        model: "llama3-70b-8192",
        max_tokens: 4000,
        temperature: 0.7,
        timeout: Duration::from_millis(30_000),
        supports_streaming: true,
        wire_format: WireFormat::StandardChat,
        env_keys: &["GROQ_API_KEY"],
    },
    ModelProfile {
        id: "qwen-turbo",
        display_name: "通义千问Turbo",
        endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation",
        model: "qwen-turbo",
        max_tokens: 4000,
        temperature: 0.7,
        timeout: Duration::from_millis(30_000),
        supports_streaming: true,
        wire_format: WireFormat::VendorEnvelope,
        env_keys: &["DASHSCOPE_API_KEY", "QWEN_API_KEY"],
    },
    ModelProfile {
        id: "qwen-max",
        display_name: "通义千问Max",
        endpoint: "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation",
        model: "qwen-max-latest",
        max_tokens: 8192,
        temperature: 0.7,
        timeout: Duration::from_millis(30_000_000),
        supports_streaming: true,
        wire_format: WireFormat::VendorEnvelope,
        env_keys: &["DASHSCOPE_API_KEY", "QWEN_API_KEY"],
    },
    ModelProfile {
        id: "openai-gpt4",
        display_name: "OpenAI GPT-4",
        endpoint: "https://api.openai.com/v1/chat/completions",
        model: "gpt-4o-mini",
        max_tokens: 4000,
        temperature: 0.7,
        timeout: Duration::from_millis(30_000),
        supports_streaming: true,
        wire_format: WireFormat::StandardChat,
        env_keys: &["OPENAI_API_KEY"],
    },
];

/// Looks up a profile by id.
pub fn find_profile(id: &str) -> Option<&'static ModelProfile> {
    BUILTIN_PROFILES.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_request_shape() {
        let messages = vec![ChatMessage::user("hello")];
        let body = WireFormat::StandardChat.build_request("gpt-4o-mini", &messages, 4000, 0.7, false);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert!(body.get("stream").is_none());

        let body = WireFormat::StandardChat.build_request("gpt-4o-mini", &messages, 4000, 0.7, true);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_vendor_envelope_nests_stream_flag() {
        let messages = vec![ChatMessage::user("你好")];
        let body = WireFormat::VendorEnvelope.build_request("qwen-turbo", &messages, 4000, 0.7, true);
        assert_eq!(body["input"]["messages"][0]["content"], "你好");
        assert_eq!(body["parameters"]["incremental_output"], true);
        assert_eq!(body["parameters"]["stream"], true);
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_extract_text_per_format() {
        let standard = serde_json::json!({
            "choices": [{"message": {"content": "  answer  "}}]
        });
        assert_eq!(WireFormat::StandardChat.extract_text(&standard).unwrap(), "answer");

        let vendor = serde_json::json!({"output": {"text": "回答"}});
        assert_eq!(WireFormat::VendorEnvelope.extract_text(&vendor).unwrap(), "回答");

        assert!(WireFormat::StandardChat.extract_text(&vendor).is_none());
    }

    #[test]
    fn test_registry_ids_unique() {
        let mut ids: Vec<_> = BUILTIN_PROFILES.iter().map(|p| p.id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), BUILTIN_PROFILES.len());
        assert!(find_profile("qwen-turbo").is_some());
        assert!(find_profile("missing").is_none());
    }
}
