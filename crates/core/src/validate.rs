//! Content validation: rule-based rejection plus an optional AI check.
//!
//! Stage 1 runs always and needs no network: length, error-page patterns,
//! raw-markup leakage, and character diversity. Stage 2 samples the
//! document at several offsets and asks the currently-selected model to
//! judge it. Infrastructure failures in stage 2 never fail the pipeline —
//! blocking every request on a best-effort quality check would be worse
//! than occasionally admitting borderline content.

use std::collections::HashSet;

use regex::Regex;

use crate::config::{ConfigPaths, ai_validation_enabled};
use crate::content::{ExtractedContent, ValidationResult};
use crate::model::{ChatMessage, ModelManager, key_is_usable};
use crate::text::{char_tail, char_window};

/// Fallback validation prompt when the resource file is missing.
const DEFAULT_VALIDATION_PROMPT: &str = "你是内容质量检测专家。判断以下内容是否有价值且适合知识转化。\n\n如果有价值，回答：有效\n如果无价值，回答：无效：[原因]\n\n待检测内容：";

/// Error-page phrases in English and Chinese. Matching either the content
/// or the title rejects the document.
const ERROR_PAGE_PATTERNS: &[&str] = &[
    r"(?i)404.*not found",
    r"(?i)403.*forbidden",
    r"(?i)500.*internal server error",
    r"(?i)502.*bad gateway",
    r"(?i)503.*service unavailable",
    r"(?i)504.*gateway timeout",
    r"(?i)access denied",
    r"(?i)page not found",
    r"(?i)error.*occurred",
    r"(?i)something went wrong",
    r"网页不存在",
    r"页面不存在",
    r"访问被拒绝",
    r"服务器错误",
    r"系统错误",
    r"出错了",
    r"网络错误",
    r"连接超时",
];

/// Raw markup / config signatures checked against the first 1000 chars.
const RAW_MARKUP_PATTERNS: &[&str] = &[
    r"(?i)nginx.*configuration",
    r"(?i)apache.*configuration",
    r"(?i)server.*configuration",
    r"(?i)database.*error",
    r"(?i)connection.*refused",
    r"(?i)timeout.*error",
    r"(?i)ssl.*certificate",
    r"^<!DOCTYPE html>",
    r"<html[^>]*>",
    r"<head[^>]*>",
    r"<body[^>]*>",
    r"(?s)^\{.*\}$",
    r"^<\?xml",
];

/// Content validator combining the rule stage with the AI stage.
pub struct ContentValidator {
    paths: ConfigPaths,
}

impl ContentValidator {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    /// Full validation: rules first, then the AI stage when enabled and a
    /// manager is supplied. Any error in the AI stage logs and passes.
    pub async fn validate(
        &self, extracted: &ExtractedContent, manager: Option<&ModelManager>,
    ) -> ValidationResult {
        let basic = basic_validation(extracted);
        if !basic.is_valid {
            return basic;
        }

        if !ai_validation_enabled() {
            tracing::debug!("AI validation disabled, rule stage only");
            return ValidationResult::valid("AI校验已禁用，仅通过基础校验");
        }

        let Some(manager) = manager else {
            return ValidationResult::valid("跳过AI校验");
        };

        self.ai_validation(extracted, manager).await
    }

    /// Rule stage only; no network I/O.
    pub fn quick_validate(&self, extracted: &ExtractedContent) -> ValidationResult {
        basic_validation(extracted)
    }

    async fn ai_validation(&self, extracted: &ExtractedContent, manager: &ModelManager) -> ValidationResult {
        let model_id = manager.select_best_model();
        let api_key = manager.default_api_key(&model_id);
        if !key_is_usable(api_key.as_deref()) {
            tracing::debug!("no usable API key, skipping AI validation");
            return ValidationResult::valid("跳过AI校验");
        }
        let api_key = api_key.unwrap_or_default();

        let sample = validation_sample(&extracted.content);
        let prompt = format!("{}\n\n{}", self.load_prompt(), sample);
        let messages = [ChatMessage::user(prompt)];

        match manager.invoke(&model_id, &messages, &api_key).await {
            Ok(reply) => interpret_reply(reply.trim()),
            Err(err) => {
                // Model infrastructure failure: log and let the content through.
                tracing::warn!(error = %err, "AI validation failed, accepting content");
                ValidationResult {
                    is_valid: true,
                    reason: "AI校验失败，默认通过".to_string(),
                    warning: Some(err.to_string()),
                }
            }
        }
    }

    fn load_prompt(&self) -> String {
        match std::fs::read_to_string(self.paths.validation_prompt_file()) {
            Ok(prompt) => prompt.trim().to_string(),
            Err(_) => DEFAULT_VALIDATION_PROMPT.to_string(),
        }
    }
}

/// Rule-based validation: length, error pages, raw markup, diversity.
pub fn basic_validation(extracted: &ExtractedContent) -> ValidationResult {
    let content = &extracted.content;
    let title = &extracted.title;

    if content.chars().count() < 50 {
        return ValidationResult::invalid("内容过短，不足50字符");
    }

    for pattern in ERROR_PAGE_PATTERNS {
        let re = Regex::new(pattern).unwrap();
        if re.is_match(content) || re.is_match(title) {
            return ValidationResult::invalid("内容疑似错误页面");
        }
    }

    let head = char_window(content, 0, 1000);
    for pattern in RAW_MARKUP_PATTERNS {
        let re = Regex::new(pattern).unwrap();
        if re.is_match(&head) {
            return ValidationResult::invalid("内容疑似技术配置或原始HTML");
        }
    }

    let distinct: HashSet<char> = content.chars().filter(|c| !c.is_whitespace()).collect();
    if distinct.len() < 20 && content.chars().count() > 200 {
        return ValidationResult::invalid("内容字符单一，疑似无意义内容");
    }

    ValidationResult::valid("基础校验通过")
}

/// Builds the document sample for the AI stage. Long documents are
/// sampled at three offsets and joined without excerpt markers, so the
/// judging model sees what looks like continuous prose.
pub fn validation_sample(content: &str) -> String {
    let total = content.chars().count();
    if total <= 800 {
        return content.to_string();
    }
    if total <= 2000 {
        return char_window(content, 0, 800);
    }

    let start = char_window(content, 0, 400);
    let middle = char_window(content, total * 2 / 5, 400);
    let end = char_tail(content, 200);
    format!("{}\n\n{}\n\n{}", start, middle, end)
}

/// Maps the judge model's free-text reply onto a verdict. Ambiguous
/// replies pass with a warning rather than blocking the pipeline.
fn interpret_reply(reply: &str) -> ValidationResult {
    tracing::debug!(%reply, "AI validation reply");

    if reply.contains("有效") {
        return ValidationResult::valid("AI校验通过");
    }
    if reply.contains("无效") {
        let re = Regex::new(r"无效[：:]\s*(.+)").unwrap();
        let reason = re
            .captures(reply)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_else(|| "AI判断内容无效".to_string());
        return ValidationResult::invalid(format!("AI校验失败: {}", reason));
    }

    tracing::warn!(%reply, "ambiguous AI validation reply");
    ValidationResult {
        is_valid: true,
        reason: "AI校验响应不明确，默认通过".to_string(),
        warning: Some(format!("响应不明确: {}", reply.chars().take(100).collect::<String>())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn content_of(text: &str, title: &str) -> ExtractedContent {
        ExtractedContent {
            content: text.to_string(),
            images: vec![],
            image_count: 0,
            title: title.to_string(),
            url: "https://example.com".to_string(),
            extracted_at: Utc::now(),
            pdf_info: None,
        }
    }

    #[test]
    fn test_short_content_rejected() {
        let result = basic_validation(&content_of("too short", "T"));
        assert!(!result.is_valid);
        assert_eq!(result.reason, "内容过短，不足50字符");
    }

    #[test]
    fn test_error_page_rejected() {
        let filler = "some padding text to get past the fifty character floor easily";
        let result = basic_validation(&content_of(
            &format!("{} 404 page Not Found {}", filler, filler),
            "Site",
        ));
        assert!(!result.is_valid);
        assert_eq!(result.reason, "内容疑似错误页面");
    }

    #[test]
    fn test_error_title_rejected() {
        let filler = "perfectly ordinary body text long enough for the validator to consider";
        let result = basic_validation(&content_of(filler, "页面不存在"));
        assert!(!result.is_valid);
    }

    #[test]
    fn test_raw_html_rejected() {
        let result = basic_validation(&content_of(
            "<!DOCTYPE html> leaked raw markup that slipped through extraction somehow",
            "T",
        ));
        assert!(!result.is_valid);
        assert_eq!(result.reason, "内容疑似技术配置或原始HTML");
    }

    #[test]
    fn test_degenerate_characters_rejected() {
        let result = basic_validation(&content_of(&"a".repeat(300), "T"));
        assert!(!result.is_valid);
        assert!(result.reason.contains("字符单一"));
    }

    #[test]
    fn test_varied_prose_passes() {
        let text = "Rust 的所有权系统在编译期避免数据竞争，同时保持零成本抽象。\
                    This mix of prose has plenty of distinct characters and enough length to pass every rule."
            .repeat(2);
        let result = basic_validation(&content_of(&text, "Ownership"));
        assert!(result.is_valid);
    }

    #[test]
    fn test_sample_short_content_untouched() {
        let text = "短内容".repeat(10);
        assert_eq!(validation_sample(&text), text);
    }

    #[test]
    fn test_sample_medium_truncates_to_800() {
        let text = "x".repeat(1500);
        assert_eq!(validation_sample(&text).chars().count(), 800);
    }

    #[test]
    fn test_sample_long_takes_three_windows() {
        let text: String = (0..3000).map(|i| char::from_digit((i % 10) as u32, 10).unwrap()).collect();
        let sample = validation_sample(&text);
        let parts: Vec<&str> = sample.split("\n\n").collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].chars().count(), 400);
        assert_eq!(parts[1].chars().count(), 400);
        assert_eq!(parts[2].chars().count(), 200);
        assert_eq!(parts[0], &text[..400]);
        assert_eq!(parts[1], &text[1200..1600]);
        assert_eq!(parts[2], &text[2800..]);
    }

    #[test]
    fn test_interpret_valid_reply() {
        assert!(interpret_reply("有效").is_valid);
        assert!(interpret_reply("这段内容有效，可以转化").is_valid);
    }

    #[test]
    fn test_interpret_invalid_reply_extracts_reason() {
        let result = interpret_reply("无效：主要是导航菜单");
        assert!(!result.is_valid);
        assert!(result.reason.contains("主要是导航菜单"));

        let result = interpret_reply("无效: mostly navigation");
        assert!(!result.is_valid);
        assert!(result.reason.contains("mostly navigation"));
    }

    #[test]
    fn test_interpret_ambiguous_reply_passes_with_warning() {
        let result = interpret_reply("I am not sure about this one");
        assert!(result.is_valid);
        assert!(result.warning.is_some());
    }
}
