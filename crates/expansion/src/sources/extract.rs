//! Content extraction: PDF, HTML and plain text to normalized plain text

use crate::errors::ExpansionError;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use tracing::{debug, warn};

/// Downloads yielding less text than this are treated as misses
pub const MIN_CONTENT_CHARS: usize = 200;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static BLOCK_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr|section|article)\s*>").expect("valid regex")
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("valid regex"));
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static HYPHEN_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z])-\n([a-z])").expect("valid regex"));

/// Detected document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    Pdf,
    Html,
    PlainText,
}

/// Sniff the format from the content type, falling back to magic bytes
pub fn detect_format(bytes: &[u8], content_type: Option<&str>) -> ContentFormat {
    let content_type = content_type.unwrap_or("").to_ascii_lowercase();
    if content_type.contains("pdf") || bytes.starts_with(b"%PDF") {
        return ContentFormat::Pdf;
    }
    if content_type.contains("html") {
        return ContentFormat::Html;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    let head = head.trim_start();
    if head.starts_with("<!doctype html") || head.starts_with("<html") {
        ContentFormat::Html
    } else {
        ContentFormat::PlainText
    }
}

/// Extract and normalize text. `Ok(None)` when the document has too little text.
pub fn extract_text(
    bytes: &[u8],
    content_type: Option<&str>,
) -> Result<Option<String>, ExpansionError> {
    let format = detect_format(bytes, content_type);
    let raw = match format {
        ContentFormat::Pdf => pdf_to_text(bytes)?,
        ContentFormat::Html => html_to_text(&String::from_utf8_lossy(bytes)),
        ContentFormat::PlainText => String::from_utf8_lossy(bytes).into_owned(),
    };

    let text = normalize_text(&raw);
    debug!(?format, chars = text.chars().count(), "Extracted document text");
    if text.chars().count() < MIN_CONTENT_CHARS {
        return Ok(None);
    }
    Ok(Some(text))
}

/// [`extract_text`] on the blocking pool, so PDF parsing never stalls the
/// runtime and an enclosing timeout can still fire
pub async fn extract_text_blocking(
    bytes: Vec<u8>,
    content_type: Option<String>,
) -> Result<Option<String>, ExpansionError> {
    tokio::task::spawn_blocking(move || extract_text(&bytes, content_type.as_deref()))
        .await
        .map_err(|e| ExpansionError::Pdf(format!("extraction task failed: {}", e)))?
}

/// [`pdf_to_text`] on the blocking pool
pub async fn pdf_to_text_blocking(bytes: Vec<u8>) -> Result<String, ExpansionError> {
    tokio::task::spawn_blocking(move || pdf_to_text(&bytes))
        .await
        .map_err(|e| ExpansionError::Pdf(format!("extraction task failed: {}", e)))?
}

/// Extract text content from an in-memory PDF
pub fn pdf_to_text(bytes: &[u8]) -> Result<String, ExpansionError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| ExpansionError::Pdf(format!("Failed to load PDF: {}", e)))?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for (&page_num, &page_id) in pages.iter() {
        match doc.extract_text(&[page_num]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => {
                // Fall back to scanning the raw content stream
                warn!(page = page_num, error = %e, "Text extraction failed, scanning content stream");
                match doc.get_page_content(page_id) {
                    Ok(content) => text.push_str(&extract_text_from_content(&content)),
                    Err(e) => warn!(page = page_num, error = %e, "Skipping unreadable page"),
                }
            }
        }
        text.push_str("\n\n");
    }

    if text.trim().is_empty() {
        return Err(ExpansionError::Pdf("No text content extracted from PDF".into()));
    }
    Ok(text)
}

/// Text between BT/ET operators of a raw content stream
fn extract_text_from_content(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let trimmed = line.trim();
        match trimmed {
            "BT" => in_text_block = true,
            "ET" => {
                in_text_block = false;
                text.push('\n');
            }
            _ if in_text_block => {
                if let Some(shown) = text_from_operator(trimmed) {
                    text.push_str(&shown);
                }
            }
            _ => {}
        }
    }
    text
}

/// Strings shown by `Tj`, `'`, `"` and `TJ` operators
fn text_from_operator(line: &str) -> Option<String> {
    if !(line.ends_with("Tj") || line.ends_with("TJ") || line.ends_with('\'') || line.ends_with('"'))
    {
        return None;
    }

    let mut result = String::new();
    let mut depth = 0usize;
    let mut current = String::new();
    let mut escaped = false;
    for ch in line.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if depth > 0 => escaped = true,
            '(' => {
                if depth > 0 {
                    current.push(ch);
                }
                depth += 1;
            }
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                } else {
                    current.push(ch);
                }
            }
            _ if depth > 0 => current.push(ch),
            _ => {}
        }
    }
    (!result.is_empty()).then_some(result)
}

/// Decode PDF string escapes
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            result.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('t') => result.push('\t'),
            Some(c) => result.push(c),
            None => {}
        }
    }
    result
}

/// Strip markup from an HTML page, keeping block boundaries as line breaks
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, " ");
    let text = STYLE_RE.replace_all(&text, " ");
    let text = BLOCK_END_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, " ");
    decode_entities(&text)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

/// Normalize extracted text while keeping paragraph breaks for the parser
pub fn normalize_text(text: &str) -> String {
    let text = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace('\u{00A0}', " ");
    let text = HYPHEN_BREAK_RE.replace_all(&text, "$1$2");

    let lines: Vec<String> = text
        .lines()
        .map(|line| {
            line.chars()
                .filter(|c| !c.is_control() || *c == '\t')
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE.replace_all(joined.trim(), "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"%PDF-1.7 ...", None), ContentFormat::Pdf);
        assert_eq!(detect_format(b"x", Some("application/pdf")), ContentFormat::Pdf);
        assert_eq!(detect_format(b"<!DOCTYPE html><html>", None), ContentFormat::Html);
        assert_eq!(detect_format(b"plain words", Some("text/plain")), ContentFormat::PlainText);
    }

    #[test]
    fn test_html_to_text() {
        let html = "<html><head><style>p{}</style><script>var a = 1;</script></head>\
                    <body><p>First &amp; foremost</p><p>Second<br>line</p></body></html>";
        let text = normalize_text(&html_to_text(html));
        assert_eq!(text, "First & foremost\nSecond\nline");
    }

    #[test]
    fn test_normalize_keeps_paragraphs() {
        let text = "Line  one\r\nline two\n\n\n\nNext para\u{201C}q\u{201D} with hy-\nphen";
        assert_eq!(
            normalize_text(text),
            "Line one\nline two\n\nNext para\"q\" with hyphen"
        );
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn test_text_from_operator() {
        assert_eq!(text_from_operator("(Hello) Tj"), Some("Hello".into()));
        assert_eq!(
            text_from_operator("[(Deep) -250 (Learning)] TJ"),
            Some("DeepLearning".into())
        );
        assert_eq!(text_from_operator("1 0 0 1 72 720 Tm"), None);
    }

    #[test]
    fn test_short_documents_are_misses() {
        assert_eq!(extract_text(b"too short", Some("text/plain")).unwrap(), None);
        let long = "word ".repeat(100);
        assert!(extract_text(long.as_bytes(), None).unwrap().is_some());
    }

    #[test]
    fn test_invalid_pdf_is_error() {
        assert!(matches!(pdf_to_text(b"%PDF-garbage"), Err(ExpansionError::Pdf(_))));
    }

    #[tokio::test]
    async fn test_extraction_runs_off_the_runtime() {
        let long = "word ".repeat(100).into_bytes();
        let text = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            extract_text_blocking(long, Some("text/plain".into())),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(text.is_some());

        let err = pdf_to_text_blocking(b"%PDF-garbage".to_vec()).await;
        assert!(matches!(err, Err(ExpansionError::Pdf(_))));
    }
}
