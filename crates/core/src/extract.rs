//! HTML content extraction.
//!
//! Extraction walks a fixed, ordered list of candidate CSS selectors and
//! keeps the single element with the most trimmed text — a greedy
//! longest-text heuristic, not a weighted scorer. Ties keep the first
//! element that reached the maximum. When no selector produces enough
//! text the extractor falls back to the whole `<body>`, then to joined
//! `<p>` elements, then to mid-sized `<div>`s.

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::content::{ExtractedContent, ImageRef};
use crate::fetch::{FetchConfig, build_client, fetch_html};
use crate::text::clean_html_text;
use crate::{DistillError, Result};

/// Candidate content containers, in evaluation order: generic article
/// containers first, then platform-specific selectors for documentation,
/// code-hosting, blog, news, and CJK sites.
pub const CONTENT_SELECTORS: &[&str] = &[
    "article",
    ".content",
    ".post-content",
    ".entry-content",
    ".article-content",
    "main",
    ".main-content",
    ".page-content",
    ".post",
    ".entry",
    ".awsdocs-container",
    ".main-content-wrapper",
    ".awsdocs-content",
    "#main-content",
    ".markdown-body",
    ".readme",
    ".article-body",
    ".post-body",
    ".content-body",
    ".text-content",
    ".article-text",
    ".article-wrapper",
    ".story-content",
    ".news-content",
    ".article-container",
    ".content-area",
    ".main-text",
    ".article-detail",
    ".content-wrap",
];

/// Minimum trimmed length for a selector candidate to win.
const MIN_CANDIDATE_CHARS: usize = 100;

/// Final cleaned content below this length is a terminal failure.
const MIN_CONTENT_CHARS: usize = 50;

/// HTML extractor: retrying fetch plus selector-based content selection.
pub struct HtmlExtractor {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HtmlExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self { client: build_client()?, config: FetchConfig::default() })
    }

    pub fn with_config(client: reqwest::Client, config: FetchConfig) -> Self {
        Self { client, config }
    }

    /// Fetches `url` (with the full retry policy) and extracts its readable
    /// content. Retries are exhausted inside the fetch step; extraction
    /// failures at this layer are terminal.
    pub async fn extract(&self, url: &str) -> Result<ExtractedContent> {
        let html = fetch_html(&self.client, url, &self.config).await?;
        extract_from_html(&html, url)
    }
}

/// Extracts readable content from an already-fetched HTML document.
pub fn extract_from_html(html: &str, url: &str) -> Result<ExtractedContent> {
    let stripped = strip_boilerplate(html);
    let doc = Html::parse_document(&stripped);

    let title = document_title(&doc);
    let (content_raw, content_element) = select_content(&doc);

    let images = match content_element {
        Some(element) => extract_images(element, url),
        None => Vec::new(),
    };

    let content = clean_html_text(&content_raw);
    let content_length = content.chars().count();

    if content_length < MIN_CONTENT_CHARS {
        let has_body = doc.select(&selector("body")).next().is_some();
        tracing::error!(
            %url,
            content_length,
            html_length = html.len(),
            %title,
            has_body,
            "content extraction failed"
        );
        return Err(DistillError::ContentTooShort {
            url: url.to_string(),
            content_length,
            html_length: html.len(),
            title,
            has_body,
        });
    }

    tracing::info!(%url, content_length, image_count = images.len(), "extracted page content");

    Ok(ExtractedContent {
        content,
        image_count: images.len(),
        images,
        title,
        url: url.to_string(),
        extracted_at: Utc::now(),
        pdf_info: None,
    })
}

/// Removes script/style/nav/header/footer and ad containers before any
/// selection runs, so fallback paths never see boilerplate text.
fn strip_boilerplate(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("style", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("nav", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("header", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!("footer", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!(".advertisement", |el| {
                    el.remove();
                    Ok(())
                }),
                lol_html::element!(".ads", |el| {
                    el.remove();
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |chunk: &[u8]| {
            output.push_str(&String::from_utf8_lossy(chunk));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    if output.is_empty() { html.to_string() } else { output }
}

/// Greedy candidate selection followed by the fallback ladder. Returns the
/// chosen text plus the element images should be read from.
fn select_content(doc: &Html) -> (String, Option<ElementRef<'_>>) {
    let mut best_text = String::new();
    let mut best_len = 0usize;
    let mut best_element: Option<ElementRef<'_>> = None;

    for selector_str in CONTENT_SELECTORS {
        let Ok(sel) = Selector::parse(selector_str) else { continue };
        for element in doc.select(&sel) {
            let text = element_text(&element);
            let trimmed = text.trim();
            let len = trimmed.chars().count();
            if len > best_len && len > MIN_CANDIDATE_CHARS {
                best_len = len;
                best_text = trimmed.to_string();
                best_element = Some(element);
            }
        }
    }

    if best_len > MIN_CANDIDATE_CHARS {
        return (best_text, best_element);
    }

    // Fallback 1: the whole body.
    let body = doc.select(&selector("body")).next();
    let mut content = body.map(|el| element_text(&el).trim().to_string()).unwrap_or_default();

    if content.chars().count() < MIN_CANDIDATE_CHARS {
        tracing::debug!("no content region found, falling back to paragraph extraction");

        // Fallback 2: every paragraph, blank-line joined.
        let paragraphs: Vec<String> = doc
            .select(&selector("p"))
            .map(|el| element_text(&el).trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let joined = paragraphs.join("\n\n");
        if joined.chars().count() > content.chars().count() {
            content = joined;
        }

        // Fallback 3: mid-sized divs, skipping both stubs and containers.
        if content.chars().count() < MIN_CANDIDATE_CHARS {
            let divs: Vec<String> = doc
                .select(&selector("div"))
                .map(|el| element_text(&el).trim().to_string())
                .filter(|t| {
                    let len = t.chars().count();
                    len > 50 && len < 2000
                })
                .collect();
            let joined = divs.join("\n\n");
            if joined.chars().count() > content.chars().count() {
                content = joined;
            }
        }
    }

    (content, body)
}

/// Collects images inside the winning content element: absolute URL,
/// alt/title attributes, figure caption, and nearby text context.
fn extract_images(element: ElementRef<'_>, page_url: &str) -> Vec<ImageRef> {
    let base = Url::parse(page_url).ok();
    let mut images = Vec::new();

    for img in element.select(&selector("img")) {
        let Some(src) = img.value().attr("src") else { continue };
        if src.starts_with("data:") {
            continue;
        }

        let absolute = match resolve_src(base.as_ref(), src) {
            Some(url) => url,
            None => continue,
        };

        images.push(ImageRef {
            url: absolute,
            alt: img.value().attr("alt").unwrap_or("").trim().to_string(),
            title: img.value().attr("title").unwrap_or("").trim().to_string(),
            caption: figure_caption(&img),
            context: parent_context(&img),
        });
    }

    images
}

fn resolve_src(base: Option<&Url>, src: &str) -> Option<String> {
    if src.contains("://") {
        return Some(src.to_string());
    }
    base.and_then(|b| b.join(src).ok()).map(|u| u.to_string())
}

/// Text of the nearest enclosing `<figure>`'s `<figcaption>`, if any.
fn figure_caption(img: &ElementRef<'_>) -> String {
    for ancestor in img.ancestors() {
        if let Some(element) = ElementRef::wrap(ancestor)
            && element.value().name() == "figure"
        {
            return element
                .select(&selector("figcaption"))
                .next()
                .map(|cap| element_text(&cap).trim().to_string())
                .unwrap_or_default();
        }
    }
    String::new()
}

/// Up to 200 characters of the immediate parent's text.
fn parent_context(img: &ElementRef<'_>) -> String {
    img.parent()
        .and_then(ElementRef::wrap)
        .map(|parent| element_text(&parent).trim().chars().take(200).collect())
        .unwrap_or_default()
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

fn document_title(doc: &Html) -> String {
    doc.select(&selector("title")).next().map(|el| element_text(&el).trim().to_string()).unwrap_or_default()
}

/// Selectors used internally are all static and known-valid.
fn selector(s: &str) -> Selector {
    Selector::parse(s).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://example.com/posts/article";

    #[test]
    fn test_article_with_images() {
        let text = "0123456789".repeat(50);
        let html = format!(
            r#"<html><head><title>Sample Post</title></head><body><nav>Home About Contact</nav><article><p>{}</p><img src="/img/one.png" alt="first diagram"><img src="https://cdn.example.com/two.png" alt="second diagram"></article><footer>footer text</footer></body></html>"#,
            text
        );

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert_eq!(extracted.content.chars().count(), 500);
        assert_eq!(extracted.title, "Sample Post");
        assert_eq!(extracted.images.len(), 2);
        assert_eq!(extracted.image_count, 2);
        assert_eq!(extracted.images[0].url, "https://example.com/img/one.png");
        assert_eq!(extracted.images[0].alt, "first diagram");
        assert_eq!(extracted.images[1].url, "https://cdn.example.com/two.png");
    }

    #[test]
    fn test_longest_candidate_wins() {
        let short = "short entry text that still clears the one hundred character candidate threshold set by the extractor..";
        let long = "much longer body text ".repeat(20);
        let html = format!(
            r#"<html><body><div class="content">{}</div><article>{}</article></body></html>"#,
            short, long
        );

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert!(extracted.content.starts_with("much longer body text"));
    }

    #[test]
    fn test_body_fallback_when_no_selector_matches() {
        let para = "paragraph content that is long enough to matter when joined with its siblings";
        let html = format!(r#"<html><body><p>{p}</p><p>{p}</p></body></html>"#, p = para);

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert!(extracted.content.contains(para));
    }

    #[test]
    fn test_boilerplate_does_not_leak_into_body_fallback() {
        let body = "real page text ".repeat(10);
        let html = format!(
            r#"<html><body><nav>navigation links everywhere</nav><div>{}</div><script>var x = "script noise";</script></body></html>"#,
            body
        );

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert!(!extracted.content.contains("navigation"));
        assert!(!extracted.content.contains("script noise"));
        assert!(extracted.content.contains("real page text"));
    }

    #[test]
    fn test_data_uri_images_skipped() {
        let text = "article body ".repeat(20);
        let html = format!(
            r#"<html><body><article><p>{}</p><img src="data:image/png;base64,AAAA" alt="inline"><img src="pic.jpg"></article></body></html>"#,
            text
        );

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert_eq!(extracted.images.len(), 1);
        assert_eq!(extracted.images[0].url, "https://example.com/posts/pic.jpg");
    }

    #[test]
    fn test_figure_caption_and_context() {
        let text = "article body ".repeat(20);
        let html = format!(
            r#"<html><body><article><p>{}</p><figure><img src="/chart.png" alt="chart"><figcaption>Quarterly revenue</figcaption></figure></article></body></html>"#,
            text
        );

        let extracted = extract_from_html(&html, PAGE_URL).unwrap();
        assert_eq!(extracted.images.len(), 1);
        assert_eq!(extracted.images[0].caption, "Quarterly revenue");
        assert!(extracted.images[0].context.contains("Quarterly revenue"));
    }

    #[test]
    fn test_too_short_page_is_terminal() {
        let html = r#"<html><head><title>Empty</title></head><body><p>tiny</p></body></html>"#;

        let err = extract_from_html(html, PAGE_URL).unwrap_err();
        match err {
            DistillError::ContentTooShort { content_length, has_body, title, .. } => {
                assert!(content_length < 50);
                assert!(has_body);
                assert_eq!(title, "Empty");
            }
            other => panic!("expected ContentTooShort, got {other:?}"),
        }
    }
}
