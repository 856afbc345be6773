//! PDF download and text extraction.
//!
//! Downloads are size-capped and sniffed for anti-bot challenge pages
//! before any parsing happens. Parsing walks each page's decoded content
//! stream and reduces positioned text runs into lines: runs on the same
//! vertical coordinate concatenate, a vertical move inserts a newline.
//! Image extraction from PDF binary streams is deliberately not
//! implemented; `images` is always empty for PDF sources.

use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use lopdf::{Dictionary, Document as LopdfDocument, Object, ObjectId};
use url::Url;

use crate::content::{DocumentMeta, ExtractedContent};
use crate::fetch::{FetchConfig, USER_AGENTS, build_client, map_status_error, map_transport_error, retry_with_backoff};
use crate::text::clean_pdf_text;
use crate::{DistillError, Result};

/// Hard cap on downloaded PDF size.
pub const MAX_PDF_BYTES: u64 = 50 * 1024 * 1024;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
const HEAD_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum cleaned text length for a parse to count as successful.
const MIN_PDF_TEXT_CHARS: usize = 100;

/// Body prefixes that mark an anti-bot challenge page instead of a PDF.
const BOT_CHALLENGE_MARKERS: &[&str] =
    &["Just a moment...", "Enable JavaScript and cookies", "cf-mitigated", "cloudflare"];

/// PDF extractor: capped, retrying download plus content-stream parsing.
pub struct PdfExtractor {
    client: reqwest::Client,
    config: FetchConfig,
}

impl PdfExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self { client: build_client()?, config: FetchConfig::default() })
    }

    pub fn with_config(client: reqwest::Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// Downloads and parses the PDF at `url`.
    ///
    /// URLs that don't look like PDFs are first confirmed with a HEAD
    /// probe; a probe that can't confirm `application/pdf` is terminal.
    pub async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        if !is_pdf_url(url) {
            self.probe_content_type(url).await?;
        }
        let bytes = self.download(url).await?;
        parse_pdf(&bytes, url)
    }

    async fn probe_content_type(&self, url: &str) -> Result<()> {
        let response = self
            .client
            .head(url)
            .header(reqwest::header::USER_AGENT, USER_AGENTS[0])
            .timeout(HEAD_PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|_| DistillError::NotPdf)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if content_type.contains("application/pdf") { Ok(()) } else { Err(DistillError::NotPdf) }
    }

    /// Downloads the body with the shared retry utility. Only
    /// transport-level failures retry; policy failures (4xx, anti-bot,
    /// size cap, format) are terminal on first sight.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = retry_with_backoff(
            self.config.max_retries,
            &self.config.retry_delays,
            is_transport_failure,
            |attempt| {
                let client = self.client.clone();
                let url = url.to_string();
                async move {
                    tracing::debug!(attempt = attempt + 1, %url, "downloading PDF");
                    download_once(&client, &url).await
                }
            },
        )
        .await?;

        inspect_body(&bytes, url)?;
        tracing::info!(%url, size_mb = bytes.len() as f64 / 1024.0 / 1024.0, "PDF downloaded");
        Ok(bytes)
    }
}

async fn download_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>> {
    let mut request = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENTS[0])
        .header(reqwest::header::ACCEPT, "application/pdf,*/*")
        .header(reqwest::header::ACCEPT_LANGUAGE, "zh-CN,zh;q=0.9,en;q=0.8")
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .header(reqwest::header::PRAGMA, "no-cache")
        .timeout(DOWNLOAD_TIMEOUT);
    if let Some(referer) = referer_for(url) {
        request = request.header(reqwest::header::REFERER, referer);
    }

    let response = request.send().await.map_err(|e| pdf_transport_error(&e, url))?;

    let status = response.status();
    if !status.is_success() {
        return Err(match status.as_u16() {
            403 => DistillError::PdfAccessDenied { message: forbidden_message(url) },
            404 => DistillError::PdfNotFound,
            _ => map_status_error(status, url),
        });
    }

    // Reject oversized bodies before buffering when the server declares a
    // length, and while streaming when it doesn't.
    if let Some(declared) = response.content_length()
        && declared > MAX_PDF_BYTES
    {
        return Err(DistillError::PdfTooLarge { limit_mb: MAX_PDF_BYTES / 1024 / 1024 });
    }

    let mut body: Vec<u8> = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| pdf_transport_error(&e, url))?;
        if body.len() as u64 + chunk.len() as u64 > MAX_PDF_BYTES {
            return Err(DistillError::PdfTooLarge { limit_mb: MAX_PDF_BYTES / 1024 / 1024 });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

/// Post-download checks: anti-bot challenge sniff on the first ~1000 bytes,
/// then the `%PDF` magic.
fn inspect_body(bytes: &[u8], url: &str) -> Result<()> {
    let prefix = String::from_utf8_lossy(&bytes[..bytes.len().min(1000)]);
    if BOT_CHALLENGE_MARKERS.iter().any(|marker| prefix.contains(marker)) {
        let message = if url.contains("dl.acm.org") {
            "ACM数字图书馆启用了反爬虫保护，无法直接访问PDF。建议手动下载后处理，或寻找该文章的开放获取版本。".to_string()
        } else {
            "网站启用了反爬虫保护，需要浏览器环境才能访问".to_string()
        };
        return Err(DistillError::AntiBotDetected { message });
    }

    if !bytes.starts_with(b"%PDF") {
        return Err(DistillError::PdfInvalidFormat);
    }

    Ok(())
}

fn pdf_transport_error(err: &reqwest::Error, url: &str) -> DistillError {
    match map_transport_error(err, url) {
        DistillError::FetchTimeout { .. } => DistillError::PdfDownloadTimeout,
        other => other,
    }
}

fn is_transport_failure(err: &DistillError) -> bool {
    matches!(
        err,
        DistillError::PdfDownloadTimeout
            | DistillError::FetchTimeout { .. }
            | DistillError::ConnectionRefused { .. }
            | DistillError::DomainResolution { .. }
            | DistillError::ServerError { .. }
            | DistillError::Http(_)
    )
}

fn forbidden_message(url: &str) -> String {
    if url.contains("dl.acm.org") {
        "ACM数字图书馆PDF访问被拒绝，可能需要ACM会员权限或机构订阅，建议在Google Scholar或arXiv寻找该文章的开放版本。"
            .to_string()
    } else if url.contains("ieee.org") {
        "IEEE PDF访问被拒绝，可能需要IEEE会员权限或机构订阅".to_string()
    } else {
        "PDF访问被拒绝，可能需要特殊权限或存在防盗链保护".to_string()
    }
}

/// Whether the URL plainly points at a PDF: extension, pdf-signalling
/// query params, or a known publisher PDF-link pattern.
pub fn is_pdf_url(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else { return false };
    let pathname = parsed.path().to_lowercase();
    let hostname = parsed.host_str().unwrap_or("").to_lowercase();

    if pathname.ends_with(".pdf") || pathname.contains("pdf") {
        return true;
    }
    for (key, value) in parsed.query_pairs() {
        if (key == "format" || key == "type") && value == "pdf" {
            return true;
        }
    }

    (hostname.contains("dl.acm.org") && pathname.contains("/doi/pdf/"))
        || (hostname.contains("ieeexplore.ieee.org") && pathname.contains("/stamp/"))
        || (hostname.contains("link.springer.com") && pathname.contains("/content/pdf/"))
        || (hostname.contains("arxiv.org") && pathname.contains("/pdf/"))
        || (hostname.contains("researchgate.net") && pathname.contains(".pdf"))
}

/// Publisher-appropriate Referer; defaults to the site root.
pub fn referer_for(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let hostname = parsed.host_str()?.to_lowercase();

    let referer = if hostname.contains("arxiv.org") {
        "https://arxiv.org/".to_string()
    } else if hostname.contains("dl.acm.org") {
        "https://dl.acm.org/".to_string()
    } else if hostname.contains("ieee.org") {
        "https://ieeexplore.ieee.org/".to_string()
    } else if hostname.contains("researchgate.net") {
        "https://www.researchgate.net/".to_string()
    } else if hostname.contains("springer.com") {
        "https://link.springer.com/".to_string()
    } else if hostname.contains("nature.com") {
        "https://www.nature.com/".to_string()
    } else {
        format!("https://{}/", hostname)
    };
    Some(referer)
}

/// Rewrites known academic landing pages to their PDF download form
/// (currently arXiv `/abs/` pages). Unknown URLs pass through unchanged.
pub fn optimize_academic_url(url: &str) -> String {
    if let Ok(parsed) = Url::parse(url)
        && let Some(host) = parsed.host_str()
        && host.to_lowercase().contains("arxiv.org")
        && url.contains("/abs/")
    {
        return format!("{}.pdf", url.replace("/abs/", "/pdf/"));
    }
    url.to_string()
}

/// Parses a downloaded PDF body into cleaned text plus document metadata.
pub fn parse_pdf(bytes: &[u8], url: &str) -> Result<ExtractedContent> {
    let doc = LopdfDocument::load_mem(bytes).map_err(|e| {
        tracing::warn!(%url, error = %e, "PDF load failed");
        DistillError::PdfCorrupted
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(DistillError::PdfEncrypted);
    }

    let pages = doc.get_pages();
    let page_count = pages.len();
    let mut full_text = String::new();
    for (page_num, page_id) in &pages {
        match extract_page_text(&doc, *page_id) {
            Ok(page_text) => {
                if !full_text.is_empty() {
                    full_text.push('\n');
                }
                full_text.push_str(&page_text);
            }
            Err(err) => {
                tracing::warn!(page = *page_num, error = %err, "skipping unparsable page");
            }
        }
    }

    let content = clean_pdf_text(&full_text);
    if content.chars().count() < MIN_PDF_TEXT_CHARS {
        return Err(DistillError::PdfInsufficientText);
    }

    let (doc_title, meta) = info_metadata(&doc, page_count);
    let title = doc_title
        .or_else(|| title_from_url(url))
        .unwrap_or_else(|| "PDF文档".to_string());

    tracing::info!(%url, pages = page_count, content_length = content.chars().count(), "PDF parsed");

    Ok(ExtractedContent {
        content,
        images: Vec::new(),
        image_count: 0,
        title,
        url: url.to_string(),
        extracted_at: Utc::now(),
        pdf_info: Some(meta),
    })
}

/// Reduces one page's positioned text runs into lines. Text shown at the
/// same vertical coordinate concatenates; a vertical move starts a new
/// line. Word gaps encoded as large `TJ` kerning adjustments become
/// spaces, except between CJK characters.
fn extract_page_text(doc: &LopdfDocument, page_id: ObjectId) -> Result<String> {
    let fonts = doc.get_page_fonts(page_id).map_err(|e| DistillError::PdfParse(e.to_string()))?;
    let content_data = page_content(doc, page_id)?;
    let content =
        lopdf::content::Content::decode(&content_data).map_err(|e| DistillError::PdfParse(e.to_string()))?;

    let mut text = String::new();
    let mut matrix = TextMatrix::default();
    let mut last_y: Option<f32> = None;
    let mut current_font: Vec<u8> = Vec::new();
    let mut in_text_block = false;

    fn show(matrix: &TextMatrix, last_y: &mut Option<f32>, text: &mut String, run: String) {
        if run.is_empty() {
            return;
        }
        let y = matrix.position().1;
        if let Some(prev) = *last_y
            && (y - prev).abs() > 0.5
            && !text.is_empty()
        {
            text.push('\n');
        }
        text.push_str(&run);
        *last_y = Some(y);
    }

    for op in content.operations {
        match op.operator.as_str() {
            "BT" => {
                in_text_block = true;
                matrix = TextMatrix::default();
            }
            "ET" => {
                in_text_block = false;
            }
            "Tf" => {
                if let Some(Object::Name(name)) = op.operands.first() {
                    current_font = name.clone();
                }
            }
            "Td" | "TD" => {
                if op.operands.len() >= 2 {
                    let tx = operand_number(&op.operands[0]).unwrap_or(0.0);
                    let ty = operand_number(&op.operands[1]).unwrap_or(0.0);
                    matrix.translate(tx, ty);
                }
            }
            "Tm" => {
                if op.operands.len() >= 6 {
                    let values: Vec<f32> =
                        op.operands.iter().take(6).map(|o| operand_number(o).unwrap_or(0.0)).collect();
                    matrix.set(values[0], values[1], values[2], values[3], values[4], values[5]);
                }
            }
            "T*" => {
                matrix.next_line();
            }
            "Tj" => {
                if in_text_block
                    && let Some(Object::String(bytes, _)) = op.operands.first()
                {
                    let run = decode_run(doc, &fonts, &current_font, bytes);
                    show(&matrix, &mut last_y, &mut text, run);
                }
            }
            "TJ" => {
                if in_text_block
                    && let Some(Object::Array(items)) = op.operands.first()
                {
                    let run = decode_tj_array(doc, &fonts, &current_font, items);
                    show(&matrix, &mut last_y, &mut text, run);
                }
            }
            "'" | "\"" => {
                matrix.next_line();
                if in_text_block {
                    let index = if op.operator == "\"" { 2 } else { 0 };
                    if let Some(Object::String(bytes, _)) = op.operands.get(index) {
                        let run = decode_run(doc, &fonts, &current_font, bytes);
                        show(&matrix, &mut last_y, &mut text, run);
                    }
                }
            }
            _ => {}
        }
    }

    Ok(text)
}

/// Text-space transform state: enough of the PDF text matrix to track the
/// current baseline position across `Td`/`TD`/`Tm`/`T*` operators.
#[derive(Debug, Clone)]
struct TextMatrix {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
    e: f32,
    f: f32,
}

impl Default for TextMatrix {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }
}

impl TextMatrix {
    fn set(&mut self, a: f32, b: f32, c: f32, d: f32, e: f32, f: f32) {
        self.a = a;
        self.b = b;
        self.c = c;
        self.d = d;
        self.e = e;
        self.f = f;
    }

    fn translate(&mut self, tx: f32, ty: f32) {
        self.e += tx * self.a + ty * self.c;
        self.f += tx * self.b + ty * self.d;
    }

    /// `T*` and the show-line operators advance by the default leading.
    fn next_line(&mut self) {
        self.f -= 12.0 * self.d;
    }

    fn position(&self) -> (f32, f32) {
        (self.e, self.f)
    }
}

fn operand_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Concatenated, decompressed content streams for one page.
fn page_content(doc: &LopdfDocument, page_id: ObjectId) -> Result<Vec<u8>> {
    let page_dict = doc.get_dictionary(page_id).map_err(|e| DistillError::PdfParse(e.to_string()))?;
    let contents = page_dict.get(b"Contents").map_err(|e| DistillError::PdfParse(e.to_string()))?;

    match contents {
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Stream(stream)) => {
                stream.decompressed_content().map_err(|e| DistillError::PdfParse(e.to_string()))
            }
            _ => Err(DistillError::PdfParse("invalid content stream".to_string())),
        },
        Object::Array(items) => {
            let mut combined = Vec::new();
            for item in items {
                if let Object::Reference(id) = item
                    && let Ok(Object::Stream(stream)) = doc.get_object(*id)
                    && let Ok(data) = stream.decompressed_content()
                {
                    combined.extend_from_slice(&data);
                    combined.push(b' ');
                }
            }
            Ok(combined)
        }
        _ => Err(DistillError::PdfParse("invalid content stream".to_string())),
    }
}

fn decode_run(
    doc: &LopdfDocument, fonts: &std::collections::BTreeMap<Vec<u8>, &Dictionary>, font_name: &[u8], bytes: &[u8],
) -> String {
    let encoding = fonts.get(font_name).and_then(|f| f.get_font_encoding(doc).ok());
    match encoding {
        Some(ref enc) => LopdfDocument::decode_text(enc, bytes).unwrap_or_else(|_| decode_pdf_string(bytes)),
        None => decode_pdf_string(bytes),
    }
}

/// TJ arrays interleave strings with kerning adjustments; adjustments
/// larger than ~200/1000 text-space units usually encode word spaces.
fn decode_tj_array(
    doc: &LopdfDocument, fonts: &std::collections::BTreeMap<Vec<u8>, &Dictionary>, font_name: &[u8],
    items: &[Object],
) -> String {
    const SPACE_THRESHOLD: f32 = 200.0;

    let mut combined = String::new();
    for item in items {
        match item {
            Object::String(bytes, _) => combined.push_str(&decode_run(doc, fonts, font_name, bytes)),
            Object::Integer(n) => maybe_push_space(&mut combined, -(*n as f32), SPACE_THRESHOLD),
            Object::Real(n) => maybe_push_space(&mut combined, -n, SPACE_THRESHOLD),
            _ => {}
        }
    }
    combined
}

fn maybe_push_space(text: &mut String, advance: f32, threshold: f32) {
    if advance > threshold
        && let Some(last) = text.chars().last()
        && last != ' '
        && !is_cjk(last)
    {
        text.push(' ');
    }
}

fn is_cjk(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x3000..=0x303F).contains(&code)
        || (0x3040..=0x30FF).contains(&code)
}

/// Title plus document metadata from the trailer's Info dictionary.
fn info_metadata(doc: &LopdfDocument, page_count: usize) -> (Option<String>, DocumentMeta) {
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| obj.as_reference().ok())
        .and_then(|id| doc.get_dictionary(id).ok());

    let field = |name: &[u8]| -> Option<String> {
        info.and_then(|dict| dict.get(name).ok()).and_then(|obj| match obj {
            Object::String(bytes, _) => {
                let value = decode_pdf_string(bytes);
                let value = value.trim().to_string();
                if value.is_empty() { None } else { Some(value) }
            }
            _ => None,
        })
    };

    let title = field(b"Title");
    let meta = DocumentMeta {
        pages: page_count,
        author: field(b"Author"),
        subject: field(b"Subject"),
        keywords: field(b"Keywords"),
        producer: field(b"Producer"),
        creator: field(b"Creator"),
    };
    (title, meta)
}

/// Decodes a PDF text string: UTF-16BE when BOM-marked, byte characters
/// otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks(2)
            .filter_map(|pair| if pair.len() == 2 { Some(u16::from_be_bytes([pair[0], pair[1]])) } else { None })
            .collect();
        return String::from_utf16(&utf16).unwrap_or_default();
    }
    bytes.iter().map(|&b| b as char).collect()
}

/// Derives a human title from the URL's final path segment: extension
/// stripped, `-`/`_` become spaces, each word capitalized.
pub fn title_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    let stem = segment.strip_suffix(".pdf").or_else(|| segment.strip_suffix(".PDF")).unwrap_or(segment);
    if stem.is_empty() {
        return None;
    }

    let title = stem
        .split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ");

    if title.is_empty() { None } else { Some(title) }
}
