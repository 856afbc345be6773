//! Transformation orchestration: prompt assembly and model dispatch.
//!
//! A transformation request combines the base instruction template, a
//! complexity clause, an optional structured image block, and the source
//! content — reduced by multi-window sampling when it is very long, so the
//! prompt keeps material from the whole document instead of only its
//! introduction.

use crate::config::ConfigPaths;
use crate::content::{Complexity, ExtractedContent, ImageRef};
use crate::model::{ChatMessage, ModelManager, key_is_usable};
use crate::text::{char_tail, char_window};
use crate::{DistillError, Result};

/// Contents longer than this are window-sampled before prompting.
pub const REDUCTION_THRESHOLD: usize = 60_000;

/// Fallback instruction template when the resource file is missing.
const DEFAULT_TRANSFORM_PROMPT: &str = "你是一个知识转化助手，请将以下内容转化为简洁、生动的文本。";

/// Orchestrates prompt building and model invocation.
pub struct Transformer {
    paths: ConfigPaths,
}

impl Transformer {
    pub fn new(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    /// Blocking transformation. Returns the transformed text and the id of
    /// the model that produced it.
    pub async fn transform(
        &self, extracted: &ExtractedContent, complexity: Complexity, manager: &ModelManager,
    ) -> Result<(String, String)> {
        let (model_id, api_key) = self.resolve_model(manager)?;
        let prompt = self.build_prompt(extracted, complexity);
        let messages = [ChatMessage::user(prompt)];

        let result = manager.invoke(&model_id, &messages, &api_key).await?;
        log_compression(extracted.content_chars(), result.chars().count());
        Ok((result, model_id))
    }

    /// Streaming transformation: deltas go to `on_chunk` as they arrive;
    /// the returned text is their concatenation.
    pub async fn transform_stream<F>(
        &self, extracted: &ExtractedContent, complexity: Complexity, manager: &ModelManager, on_chunk: F,
    ) -> Result<(String, String)>
    where
        F: FnMut(&str),
    {
        let (model_id, api_key) = self.resolve_model(manager)?;
        let prompt = self.build_prompt(extracted, complexity);
        let messages = [ChatMessage::user(prompt)];

        let result = manager.invoke_streaming(&model_id, &messages, &api_key, on_chunk).await?;
        log_compression(extracted.content_chars(), result.chars().count());
        Ok((result, model_id))
    }

    /// Resolves the model up front so a missing key fails fast with the
    /// model's name instead of surfacing from inside the call.
    fn resolve_model(&self, manager: &ModelManager) -> Result<(String, String)> {
        let model_id = manager.select_best_model();
        let profile = manager.profile(&model_id)?;

        let api_key = manager.default_api_key(&model_id);
        if !key_is_usable(api_key.as_deref()) {
            return Err(DistillError::MissingApiKey(profile.display_name.to_string()));
        }
        Ok((model_id, api_key.unwrap_or_default()))
    }

    /// Assembles the full prompt: template, complexity clause, image
    /// block, target-length directive, and the (possibly reduced) content.
    pub fn build_prompt(&self, extracted: &ExtractedContent, complexity: Complexity) -> String {
        let base = self.load_prompt();
        let images = image_section(&extracted.images);
        let content = reduce_long_content(&extracted.content);

        format!(
            "{}\n\n{}{}\n\n请转化以下内容，确保输出完整、详细的内容（目标长度1000-2000字）：\n\n{}",
            base,
            complexity.instruction(),
            images,
            content
        )
    }

    fn load_prompt(&self) -> String {
        match std::fs::read_to_string(self.paths.transform_prompt_file()) {
            Ok(prompt) => prompt.trim().to_string(),
            Err(err) => {
                tracing::debug!(error = %err, "transform prompt unavailable, using embedded default");
                DEFAULT_TRANSFORM_PROMPT.to_string()
            }
        }
    }
}

/// Window-samples very long content: 18k chars from the start, 12k at the
/// 25% and 50% offsets, 8k at 75%, and the final 10k, blank-line joined.
/// Content at or under the threshold passes through unchanged.
pub fn reduce_long_content(content: &str) -> String {
    let total = content.chars().count();
    if total <= REDUCTION_THRESHOLD {
        return content.to_string();
    }

    let start = char_window(content, 0, 18_000);
    let quarter = char_window(content, total / 4, 12_000);
    let middle = char_window(content, total / 2, 12_000);
    let three_quarter = char_window(content, total * 3 / 4, 8_000);
    let end = char_tail(content, 10_000);

    let reduced = format!("{}\n\n{}\n\n{}\n\n{}\n\n{}", start, quarter, middle, three_quarter, end);
    tracing::info!(
        original_chars = total,
        reduced_chars = reduced.chars().count(),
        "content window-sampled before prompting"
    );
    reduced
}

/// The structured image block: per-image metadata plus instructions to
/// reference relevant images inline with markdown image syntax.
pub fn image_section(images: &[ImageRef]) -> String {
    if images.is_empty() {
        return String::new();
    }

    let mut section = format!(
        "\n\n= 文章中的图片信息 =\n本文包含 {} 张图片，以下是图片的相关信息：\n\n",
        images.len()
    );
    for (index, image) in images.iter().enumerate() {
        section.push_str(&format!("图片 {}:\n", index + 1));
        if !image.alt.is_empty() {
            section.push_str(&format!("- 描述：{}\n", image.alt));
        }
        if !image.title.is_empty() {
            section.push_str(&format!("- 标题：{}\n", image.title));
        }
        if !image.caption.is_empty() {
            section.push_str(&format!("- 说明：{}\n", image.caption));
        }
        if !image.context.is_empty() {
            section.push_str(&format!("- 上下文：{}\n", image.context));
        }
        section.push_str(&format!("- 链接：{}\n\n", image.url));
    }
    section.push_str(
        "请在转化后的内容中：\n1. 对重要图片进行描述和总结\n2. 解释图片与文章内容的关系\n3. 如果图片有助于理解，请在适当位置提及\n4. 可以使用markdown的图片语法：![描述](链接)\n\n",
    );
    section
}

fn log_compression(original: usize, transformed: usize) {
    if original == 0 {
        return;
    }
    let ratio = transformed as f64 / original as f64;
    if ratio > 1.0 {
        tracing::info!(original, transformed, ratio, expanded_by = transformed - original, "content expanded");
    } else {
        tracing::info!(original, transformed, ratio, compressed_by = original - transformed, "content compressed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn extracted(content: &str, images: Vec<ImageRef>) -> ExtractedContent {
        ExtractedContent {
            content: content.to_string(),
            image_count: images.len(),
            images,
            title: "T".to_string(),
            url: "https://example.com/a".to_string(),
            extracted_at: Utc::now(),
            pdf_info: None,
        }
    }

    fn marked_text(total: usize) -> String {
        // Digits make char offsets easy to verify by substring.
        let mut text = String::with_capacity(total + 16);
        let mut i = 0usize;
        while text.len() < total {
            text.push_str(&format!("<{:08}>", i));
            i += 1;
        }
        text.truncate(total);
        text
    }

    #[test]
    fn test_short_content_not_reduced() {
        let text = marked_text(10_000);
        assert_eq!(reduce_long_content(&text), text);
    }

    #[test]
    fn test_long_content_samples_all_offsets() {
        let total = 100_000;
        let text = marked_text(total);
        let reduced = reduce_long_content(&text);

        assert!(reduced.chars().count() <= 18_000 + 12_000 + 12_000 + 8_000 + 10_000 + 8);
        // Recognizable substrings from each window.
        assert!(reduced.contains(&text[0..10]));
        assert!(reduced.contains(&text[25_000..25_010]));
        assert!(reduced.contains(&text[50_000..50_010]));
        assert!(reduced.contains(&text[75_000..75_010]));
        assert!(reduced.contains(&text[total - 10..]));
        assert_eq!(reduced.split("\n\n").count(), 5);
    }

    #[test]
    fn test_prompt_includes_complexity_and_directive() {
        let transformer = Transformer::new(ConfigPaths::under("/nonexistent"));
        let prompt = transformer.build_prompt(&extracted("body text", vec![]), Complexity::Intermediate);

        assert!(prompt.contains(DEFAULT_TRANSFORM_PROMPT));
        assert!(prompt.contains("专业术语"));
        assert!(prompt.contains("1000-2000字"));
        assert!(prompt.contains("body text"));
        assert!(!prompt.contains("图片信息"));
    }

    #[test]
    fn test_prompt_uses_file_template_when_present() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("prompts")).unwrap();
        std::fs::write(dir.path().join("prompts/transform-prompt.txt"), "CUSTOM TEMPLATE\n").unwrap();

        let transformer = Transformer::new(ConfigPaths::under(dir.path()));
        let prompt = transformer.build_prompt(&extracted("body", vec![]), Complexity::Beginner);
        assert!(prompt.starts_with("CUSTOM TEMPLATE"));
    }

    #[test]
    fn test_image_block_lists_each_image() {
        let images = vec![
            ImageRef {
                url: "https://example.com/a.png".into(),
                alt: "architecture diagram".into(),
                title: String::new(),
                caption: "figure one".into(),
                context: "surrounding text".into(),
            },
            ImageRef {
                url: "https://example.com/b.png".into(),
                alt: String::new(),
                title: String::new(),
                caption: String::new(),
                context: String::new(),
            },
        ];
        let section = image_section(&images);

        assert!(section.contains("本文包含 2 张图片"));
        assert!(section.contains("图片 1:"));
        assert!(section.contains("- 描述：architecture diagram"));
        assert!(section.contains("- 说明：figure one"));
        assert!(section.contains("图片 2:"));
        assert!(section.contains("![描述](链接)"));
    }
}
