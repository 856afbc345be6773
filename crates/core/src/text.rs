//! Text cleanup shared by both extractors.
//!
//! HTML extraction and PDF parsing both end in the same normalization:
//! horizontal whitespace collapses to single spaces, paragraph breaks
//! survive as exactly one blank line, and PDF text additionally loses page
//! artifacts, hyphenated line wraps, and runaway punctuation. The PDF
//! pipeline is idempotent: cleaning already-clean text changes nothing.

use regex::Regex;

/// Normalizes whitespace in extracted HTML text.
///
/// Runs of spaces and tabs collapse to one space, whitespace around
/// newlines is trimmed, and runs of two or more blank lines collapse to a
/// single blank line.
pub fn clean_html_text(text: &str) -> String {
    collapse_whitespace(text).trim().to_string()
}

/// Cleans text assembled from PDF content streams.
///
/// On top of the HTML normalization this strips control characters and
/// page-number artifacts ("Page N" / "第N页"), merges words hyphenated
/// across line wraps, and caps punctuation runs at three characters.
pub fn clean_pdf_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let control = Regex::new(r"[\x00-\x08\x0B-\x1F\x7F]").unwrap();
    let mut cleaned = control.replace_all(text, " ").to_string();

    let cn_page = Regex::new(r"第\s*\d+\s*页").unwrap();
    cleaned = cn_page.replace_all(&cleaned, "").to_string();
    let en_page = Regex::new(r"(?i)Page\s*\d+").unwrap();
    cleaned = en_page.replace_all(&cleaned, "").to_string();

    // Merge hyphenated line wraps to a fixpoint: a single pass can leave a
    // new pair behind when wraps are adjacent ("a-\nb-\nc").
    let hyphen_wrap = Regex::new(r"(\w)-[^\S\n]*\n\s*(\w)").unwrap();
    loop {
        let merged = hyphen_wrap.replace_all(&cleaned, "${1}${2}").to_string();
        if merged == cleaned {
            break;
        }
        cleaned = merged;
    }

    cleaned = collapse_whitespace(&cleaned);

    let dots = Regex::new(r"\.{3,}").unwrap();
    cleaned = dots.replace_all(&cleaned, "...").to_string();
    let dashes = Regex::new(r"-{3,}").unwrap();
    cleaned = dashes.replace_all(&cleaned, "---").to_string();

    cleaned.trim().to_string()
}

/// Horizontal whitespace → one space; 2+ blank lines → one blank line.
fn collapse_whitespace(text: &str) -> String {
    let horizontal = Regex::new(r"[^\S\n]+").unwrap();
    let collapsed = horizontal.replace_all(text, " ");

    let around_newlines = Regex::new(r" ?\n ?").unwrap();
    let collapsed = around_newlines.replace_all(&collapsed, "\n");

    let blank_runs = Regex::new(r"\n{3,}").unwrap();
    blank_runs.replace_all(&collapsed, "\n\n").to_string()
}

/// A window of `len` characters starting at character offset `start`.
/// Character-based so CJK text is never split mid-codepoint.
pub(crate) fn char_window(text: &str, start: usize, len: usize) -> String {
    text.chars().skip(start).take(len).collect()
}

/// The final `len` characters of `text`.
pub(crate) fn char_tail(text: &str, len: usize) -> String {
    let total = text.chars().count();
    char_window(text, total.saturating_sub(len), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_html_clean_collapses_spaces() {
        assert_eq!(clean_html_text("a   b\t\tc"), "a b c");
    }

    #[test]
    fn test_html_clean_keeps_one_blank_line() {
        assert_eq!(clean_html_text("para one\n\n\n\npara two"), "para one\n\npara two");
    }

    #[test]
    fn test_pdf_clean_strips_page_markers() {
        let cleaned = clean_pdf_text("intro Page 3 body 第 12 页 outro");
        assert!(!cleaned.contains("Page"));
        assert!(!cleaned.contains("页"));
        assert!(cleaned.contains("intro"));
        assert!(cleaned.contains("outro"));
    }

    #[test]
    fn test_pdf_clean_merges_hyphen_wraps() {
        assert_eq!(clean_pdf_text("over-\nflow"), "overflow");
        assert_eq!(clean_pdf_text("a-\nb-\nc"), "abc");
    }

    #[test]
    fn test_pdf_clean_caps_punctuation_runs() {
        assert_eq!(clean_pdf_text("wait......."), "wait...");
        assert_eq!(clean_pdf_text("a ------ b"), "a --- b");
    }

    #[rstest]
    #[case("")]
    #[case("plain sentence.")]
    #[case("over-\nflow with Page 2 artifacts....\n\n\n\nnext 第3页 para")]
    #[case("a-\nb-\nc mixed   spacing\there")]
    #[case("中文内容，换行-\n测试。")]
    fn test_pdf_clean_is_idempotent(#[case] input: &str) {
        let once = clean_pdf_text(input);
        let twice = clean_pdf_text(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_char_window_respects_codepoints() {
        let text = "中文abc内容";
        assert_eq!(char_window(text, 2, 3), "abc");
        assert_eq!(char_tail(text, 2), "内容");
        assert_eq!(char_tail("ab", 10), "ab");
    }
}
