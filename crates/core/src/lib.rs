pub mod cache;
pub mod classify;
pub mod config;
pub mod content;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod pdf;
pub mod pipeline;
pub mod text;
pub mod transform;
pub mod validate;

pub use cache::ContentCache;
pub use classify::{Classification, Classifier, ClassifierConfig, ContentType};
pub use config::ConfigPaths;
pub use content::{
    Complexity, DocumentMeta, ExtractedContent, ImageRef, StreamEvent, Transformation, ValidationResult,
};
pub use error::{DistillError, Result};
pub use extract::{CONTENT_SELECTORS, HtmlExtractor, extract_from_html};
pub use fetch::{FetchConfig, USER_AGENTS, build_client, fetch_html, retry_with_backoff};
pub use model::{
    BUILTIN_PROFILES, ChatMessage, ModelManager, ModelProfile, ModelStatus, SelectionConfig, SseAccumulator,
    WireFormat,
};
pub use pdf::{MAX_PDF_BYTES, PdfExtractor, is_pdf_url, optimize_academic_url, parse_pdf};
pub use pipeline::Distiller;
pub use text::{clean_html_text, clean_pdf_text};
pub use transform::{Transformer, image_section, reduce_long_content};
pub use validate::{ContentValidator, basic_validation, validation_sample};
