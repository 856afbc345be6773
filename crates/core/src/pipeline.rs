//! The end-to-end pipeline: classify → extract → validate → transform.
//!
//! [`Distiller`] is the inbound surface callers use. Extraction routes
//! PDFs through the PDF extractor (after academic-URL optimization) and
//! everything else through the HTML extractor; a PDF failure on a URL
//! that is not unambiguously a PDF falls back to HTML extraction. Results
//! are cached by raw URL for 24 hours. Multiple requests may run this
//! pipeline concurrently; there is no cross-request state beyond the
//! cache, and identical in-flight URLs are not coalesced.

use regex::Regex;
use url::Url;

use crate::cache::ContentCache;
use crate::classify::Classifier;
use crate::config::ConfigPaths;
use crate::content::{Complexity, ExtractedContent, StreamEvent, Transformation};
use crate::extract::HtmlExtractor;
use crate::fetch::{FetchConfig, build_client};
use crate::model::ModelManager;
use crate::pdf::{PdfExtractor, is_pdf_url, optimize_academic_url};
use crate::transform::Transformer;
use crate::validate::ContentValidator;
use crate::{DistillError, Result};

/// The assembled pipeline.
pub struct Distiller {
    classifier: Classifier,
    manager: ModelManager,
    validator: ContentValidator,
    transformer: Transformer,
    html: HtmlExtractor,
    pdf: PdfExtractor,
    cache: ContentCache,
}

impl Distiller {
    /// A pipeline using the default config locations.
    pub fn new() -> Result<Self> {
        Self::with_paths(ConfigPaths::default())
    }

    pub fn with_paths(paths: ConfigPaths) -> Result<Self> {
        let client = build_client()?;
        let fetch_config = FetchConfig::default();
        Ok(Self {
            classifier: Classifier::from_file(&paths.content_types_file()),
            manager: ModelManager::new(&paths)?,
            validator: ContentValidator::new(paths.clone()),
            transformer: Transformer::new(paths),
            html: HtmlExtractor::with_config(client.clone(), fetch_config.clone()),
            pdf: PdfExtractor::with_config(client, fetch_config),
            cache: ContentCache::with_default_ttl(),
        })
    }

    pub fn model_manager(&self) -> &ModelManager {
        &self.manager
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Extracts content for `url`, using the cache and routing between
    /// the PDF and HTML extractors.
    pub async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        if let Some(cached) = self.cache.get(url).await {
            tracing::info!(%url, "serving extraction from cache");
            return Ok(cached);
        }

        let optimized = optimize_academic_url(url);
        if is_pdf_url(&optimized) || is_pdf_url(url) {
            tracing::info!(%url, "routing to PDF extractor");
            match self.pdf.extract(&optimized).await {
                Ok(data) => {
                    self.cache.insert(url.to_string(), data.clone()).await;
                    return Ok(data);
                }
                Err(err) => {
                    if clearly_pdf(url) {
                        // The URL unambiguously names a PDF: HTML extraction
                        // would only produce garbage, so stop here.
                        return Err(err);
                    }
                    tracing::info!(%url, error = %err, "PDF extraction failed, trying HTML");
                }
            }
        }

        let data = self.html.extract(url).await?;
        self.cache.insert(url.to_string(), data.clone()).await;
        Ok(data)
    }

    /// Blocking transformation of one URL.
    pub async fn distill(&self, url: &str, complexity: Complexity) -> Result<Transformation> {
        self.check_url(url)?;

        let extracted = self.extract(url).await?;
        tracing::info!(
            %url,
            content_chars = extracted.content_chars(),
            image_count = extracted.image_count,
            "extraction complete"
        );

        let validation = self.validator.validate(&extracted, Some(&self.manager)).await;
        if !validation.is_valid {
            return Err(DistillError::ValidationRejected { reason: validation.reason });
        }

        let (result, model_id) = self.transformer.transform(&extracted, complexity, &self.manager).await?;
        Ok(build_transformation(url, &extracted, result, model_id))
    }

    /// Streaming transformation: progress and content-chunk events are
    /// delivered through `on_event` as they happen; the final
    /// `Transformation` is both emitted as a `Complete` event and
    /// returned. Failures emit an `Error` event and propagate.
    pub async fn distill_stream<F>(
        &self, url: &str, complexity: Complexity, mut on_event: F,
    ) -> Result<Transformation>
    where
        F: FnMut(StreamEvent),
    {
        on_event(StreamEvent::Init { message: "开始处理请求...".to_string() });

        match self.distill_stream_inner(url, complexity, &mut on_event).await {
            Ok(transformation) => {
                on_event(StreamEvent::Complete { data: transformation.clone() });
                Ok(transformation)
            }
            Err(err) => {
                on_event(StreamEvent::Error { error: err.to_string() });
                Err(err)
            }
        }
    }

    async fn distill_stream_inner<F>(
        &self, url: &str, complexity: Complexity, on_event: &mut F,
    ) -> Result<Transformation>
    where
        F: FnMut(StreamEvent),
    {
        self.check_url(url)?;

        on_event(progress("extracting", "正在提取网页内容...".to_string()));
        let extracted = self.extract(url).await?;
        on_event(progress(
            "extracted",
            format!(
                "内容提取完成，共 {} 字符，{} 张图片",
                extracted.content_chars(),
                extracted.image_count
            ),
        ));

        on_event(progress("validating", "正在校验内容质量...".to_string()));
        let validation = self.validator.validate(&extracted, Some(&self.manager)).await;
        if !validation.is_valid {
            return Err(DistillError::ValidationRejected { reason: validation.reason });
        }
        on_event(progress("validated", format!("内容校验通过：{}", validation.reason)));

        on_event(progress("transforming", "正在进行AI智能转化...".to_string()));
        let model_id = self.manager.select_best_model();
        if let Ok(profile) = self.manager.profile(&model_id) {
            on_event(progress("model_selected", format!("使用 {} 进行转化", profile.display_name)));
        }

        let (result, model_id) = self
            .transformer
            .transform_stream(&extracted, complexity, &self.manager, |chunk| {
                on_event(StreamEvent::ContentChunk { chunk: chunk.to_string() });
            })
            .await?;

        Ok(build_transformation(url, &extracted, result, model_id))
    }

    fn check_url(&self, url: &str) -> Result<()> {
        Url::parse(url).map_err(|e| DistillError::InvalidUrl(e.to_string()))?;

        let classification = self.classifier.classify(url);
        if !classification.allowed {
            return Err(DistillError::NotAllowed { reason: classification.reason });
        }
        Ok(())
    }
}

fn progress(stage: &str, message: String) -> StreamEvent {
    StreamEvent::Progress { stage: stage.to_string(), message }
}

fn build_transformation(
    url: &str, extracted: &ExtractedContent, result: String, model_id: String,
) -> Transformation {
    let title = derive_title(url, &result);
    Transformation {
        original_length: extracted.content_chars(),
        transformed_length: result.chars().count(),
        image_count: extracted.image_count,
        images: extracted.images.clone(),
        model: model_id,
        title,
        source_url: url.to_string(),
        result,
    }
}

/// Title for the transformation: the output's first markdown H1 when it
/// has one, otherwise host + path, otherwise a URL prefix.
fn derive_title(url: &str, result: &str) -> String {
    let heading = Regex::new(r"(?m)^#\s*(.+)$").unwrap();
    if let Some(caps) = heading.captures(result) {
        return caps[1].trim().to_string();
    }

    match Url::parse(url) {
        Ok(parsed) => format!("{}{}", parsed.host_str().unwrap_or(""), parsed.path()),
        Err(_) => url.chars().take(100).collect(),
    }
}

/// Whether the URL is unambiguously a PDF link — the condition under which
/// PDF extraction failures do not fall back to HTML.
fn clearly_pdf(url: &str) -> bool {
    let lower = url.to_lowercase();
    is_pdf_url(url)
        || lower.contains(".pdf")
        || lower.contains("/doi/pdf/")
        || lower.contains("/content/pdf/")
        || lower.contains("/stamp/stamp.jsp")
        || lower.contains("arxiv.org/pdf/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_title_prefers_markdown_heading() {
        let result = "# 深入理解所有权\n\n正文...";
        assert_eq!(derive_title("https://example.com/rust/ownership", result), "深入理解所有权");
    }

    #[test]
    fn test_derive_title_falls_back_to_url() {
        assert_eq!(
            derive_title("https://example.com/rust/ownership", "no heading here"),
            "example.com/rust/ownership"
        );
    }

    #[test]
    fn test_clearly_pdf() {
        assert!(clearly_pdf("https://example.com/a.PDF"));
        assert!(clearly_pdf("https://dl.acm.org/doi/pdf/10.1/x"));
        assert!(!clearly_pdf("https://example.com/article"));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_before_fetch() {
        let distiller = Distiller::with_paths(ConfigPaths::under("/nonexistent")).unwrap();
        let err = distiller.distill("not a url", Complexity::Beginner).await.unwrap_err();
        assert!(matches!(err, DistillError::InvalidUrl(_)));
    }
}
