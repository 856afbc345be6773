//! Data model shared across the pipeline.
//!
//! This module defines [`ExtractedContent`], the output of both extractors,
//! along with the image, metadata, and streaming event types that travel
//! with it. Serialized field names match the wire shapes the transport
//! layer exposes to clients, so these structs serialize as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single image found inside the winning content element.
///
/// `url` is always absolute: relative `src` values are resolved against the
/// source document's URL before this struct is constructed. That resolution
/// is an invariant of the extractor, not something consumers re-check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageRef {
    /// Absolute image URL.
    #[serde(rename = "src")]
    pub url: String,
    /// `alt` attribute text, empty if absent.
    pub alt: String,
    /// `title` attribute text, empty if absent.
    pub title: String,
    /// Nearest enclosing `<figure>`'s `<figcaption>` text, empty if absent.
    pub caption: String,
    /// Up to 200 characters of the immediate parent's text.
    pub context: String,
}

/// Document-level metadata recovered from a PDF's Info dictionary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub pages: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
}

/// The cleaned output of either extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedContent {
    /// Cleaned text content.
    pub content: String,
    /// Images in document order. Always empty for PDFs.
    pub images: Vec<ImageRef>,
    #[serde(rename = "imageCount")]
    pub image_count: usize,
    /// Document title (page `<title>`, PDF metadata, or URL-derived fallback).
    pub title: String,
    /// The URL the content was extracted from.
    pub url: String,
    #[serde(rename = "extractedAt")]
    pub extracted_at: DateTime<Utc>,
    /// PDF document metadata; `None` for HTML sources.
    #[serde(rename = "pdfInfo", skip_serializing_if = "Option::is_none")]
    pub pdf_info: Option<DocumentMeta>,
}

impl ExtractedContent {
    /// Character count of the cleaned content.
    pub fn content_chars(&self) -> usize {
        self.content.chars().count()
    }
}

/// Target audience for the transformed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Simple language, concept-first explanations.
    #[default]
    Beginner,
    /// Jargon allowed, but explained.
    Intermediate,
}

impl Complexity {
    /// The instruction clause appended to the transformation prompt.
    pub fn instruction(&self) -> &'static str {
        match self {
            Complexity::Beginner => "内容应适合初学者理解，使用简单易懂的语言，多用基础概念解释。",
            Complexity::Intermediate => "内容应适合有一定基础的读者，可以包含一些专业术语，但要确保解释清楚。",
        }
    }
}

impl std::str::FromStr for Complexity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "beginner" => Ok(Complexity::Beginner),
            "intermediate" => Ok(Complexity::Intermediate),
            _ => Err(format!("Invalid complexity: {}. Valid options: beginner, intermediate", s)),
        }
    }
}

/// The result of rule-based and AI content validation.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ValidationResult {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self { is_valid: true, reason: reason.into(), warning: None }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self { is_valid: false, reason: reason.into(), warning: None }
    }
}

/// The final output of a transformation request.
#[derive(Debug, Clone, Serialize)]
pub struct Transformation {
    /// The model-generated document.
    pub result: String,
    #[serde(rename = "originalLength")]
    pub original_length: usize,
    #[serde(rename = "transformedLength")]
    pub transformed_length: usize,
    #[serde(rename = "imageCount")]
    pub image_count: usize,
    pub images: Vec<ImageRef>,
    /// Id of the model that produced the result.
    pub model: String,
    /// Title derived from the source document or the transformed output.
    pub title: String,
    #[serde(rename = "sourceUrl")]
    pub source_url: String,
}

/// Incremental events emitted by the streaming pipeline.
///
/// Produced by the model manager's stream parser and forwarded by the
/// orchestrator; the transport layer serializes each event as one SSE data
/// line and terminates the stream with a literal `[DONE]`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Init { message: String },
    Progress { stage: String, message: String },
    ContentChunk { chunk: String },
    Complete { data: Transformation },
    Error { error: String },
}
