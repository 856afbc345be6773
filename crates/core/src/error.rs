//! Error types for distillation operations.
//!
//! This module defines the main error type [`DistillError`] which covers
//! every terminal condition in the extraction, validation, and model
//! invocation pipeline. Every variant renders a message specific enough to
//! show to an end user directly; generic "an error occurred" text is
//! deliberately absent.

use thiserror::Error;

/// Main error type for the extraction → validation → transformation pipeline.
///
/// Fetch-related variants carry the offending URL so the rendered message
/// is self-contained. Model-provider variants carry the backend's display
/// name for the same reason.
#[derive(Error, Debug)]
pub enum DistillError {
    /// HTTP request errors from reqwest that have no more specific mapping.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid or unparseable URL.
    #[error("无效的URL格式: {0}")]
    InvalidUrl(String),

    /// DNS resolution failed for the target host.
    #[error("无法获取URL内容: {url} - 域名解析失败，请检查网址是否正确")]
    DomainResolution { url: String },

    /// TCP connection refused or dropped before a response arrived.
    #[error("无法获取URL内容: {url} - 连接被拒绝，服务器可能不可用")]
    ConnectionRefused { url: String },

    /// Request exceeded its deadline.
    #[error("无法获取URL内容: {url} - 请求超时，网络或服务器响应较慢")]
    FetchTimeout { url: String },

    /// The server answered 403.
    #[error("无法获取URL内容: {url} - 访问被禁止，网站可能有反爬虫保护")]
    AccessForbidden { url: String },

    /// The server answered 404.
    #[error("无法获取URL内容: {url} - 页面不存在")]
    PageNotFound { url: String },

    /// The server answered 429.
    #[error("无法获取URL内容: {url} - 请求过于频繁，请稍后再试")]
    RateLimited { url: String },

    /// The server answered with a 5xx status.
    #[error("无法获取URL内容: {url} - 服务器内部错误 ({status})")]
    ServerError { url: String, status: u16 },

    /// Any other fetch failure, wrapping the underlying message.
    #[error("无法获取URL内容: {url} - {message}")]
    FetchFailed { url: String, message: String },

    /// Extraction produced less than the minimum viable amount of text.
    ///
    /// Carries the diagnostic context a maintainer needs to understand why
    /// a page yielded nothing: extracted length, raw HTML length, the page
    /// title, and whether a `<body>` was present at all.
    #[error("无法提取有效内容。URL: {url} 提取到的内容长度: {content_length} 字符")]
    ContentTooShort { url: String, content_length: usize, html_length: usize, title: String, has_body: bool },

    /// The content validator rejected the extracted text.
    #[error("内容校验失败: {reason}")]
    ValidationRejected { reason: String },

    /// The content-type policy does not permit extracting this URL.
    #[error("该类型内容不允许提取: {reason}")]
    NotAllowed { reason: String },

    /// PDF download exceeded the configured size cap.
    #[error("PDF文件过大（超过{limit_mb}MB限制）")]
    PdfTooLarge { limit_mb: u64 },

    /// PDF download timed out.
    #[error("PDF下载超时，文件可能过大或网络较慢")]
    PdfDownloadTimeout,

    /// The response body was an anti-bot challenge page, not a document.
    #[error("{message}")]
    AntiBotDetected { message: String },

    /// The server refused access to the PDF (403), with a site-specific hint.
    #[error("{message}")]
    PdfAccessDenied { message: String },

    /// The PDF does not exist (404).
    #[error("PDF文件不存在")]
    PdfNotFound,

    /// The downloaded bytes are not a PDF.
    #[error("下载的文件不是有效的PDF格式")]
    PdfInvalidFormat,

    /// The URL does not point at a PDF and the HEAD probe could not confirm one.
    #[error("无法确认URL是否指向PDF文件，请检查URL格式")]
    NotPdf,

    /// The PDF is encrypted and cannot be read without a password.
    #[error("PDF文件已加密，需要密码才能访问")]
    PdfEncrypted,

    /// The PDF structure is damaged or unparseable.
    #[error("PDF文件结构损坏或不是有效的PDF格式")]
    PdfCorrupted,

    /// Parsing succeeded but yielded too little text (likely a scanned PDF).
    #[error("PDF中没有提取到足够的文本内容，可能是扫描版PDF或图像PDF")]
    PdfInsufficientText,

    /// Any other PDF parsing failure.
    #[error("PDF内容解析失败: {0}")]
    PdfParse(String),

    /// The requested model id is not in the registry.
    #[error("不支持的模型: {0}")]
    UnknownModel(String),

    /// No usable API key is configured for the resolved model.
    #[error("未配置{0}的API密钥")]
    MissingApiKey(String),

    /// The backend rejected the configured API key (401).
    #[error("{model} API密钥无效")]
    InvalidApiKey { model: String },

    /// The backend rate-limited the call (429).
    #[error("{model} API调用频率限制，请稍后重试")]
    ProviderRateLimited { model: String },

    /// The backend host could not be reached at all.
    #[error("无法连接到{model}服务")]
    ProviderUnreachable { model: String },

    /// The model call exceeded the profile's timeout.
    #[error("{model} 请求超时 ({timeout_ms}ms)，请检查网络连接或稍后重试")]
    ProviderTimeout { model: String, timeout_ms: u64 },

    /// Any other backend failure, wrapping the underlying message.
    #[error("{model} 服务暂时不可用: {message}")]
    ProviderUnavailable { model: String, message: String },

    /// A streaming call opened but ended without delivering any text.
    #[error("流式响应未收到有效数据")]
    EmptyStream,

    /// A streaming call failed before the SSE body started.
    #[error("HTTP {status}: {body}")]
    StreamStatus { status: u16, body: String },

    /// File I/O errors (prompt/config resources).
    #[error("Failed to read resource: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors.
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for [`DistillError`].
pub type Result<T> = std::result::Result<T, DistillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_message_names_blocking() {
        let err = DistillError::AccessForbidden { url: "https://example.com/a".into() };
        assert!(err.to_string().contains("访问被禁止"));
        assert!(err.to_string().contains("https://example.com/a"));
    }

    #[test]
    fn test_size_cap_message_cites_limit() {
        let err = DistillError::PdfTooLarge { limit_mb: 50 };
        assert!(err.to_string().contains("50MB"));
    }

    #[test]
    fn test_server_error_carries_status() {
        let err = DistillError::ServerError { url: "https://example.com".into(), status: 502 };
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_missing_key_names_model() {
        let err = DistillError::MissingApiKey("Groq Llama3".into());
        assert!(err.to_string().contains("Groq Llama3"));
    }
}
