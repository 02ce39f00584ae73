//! Citation regexes and text heuristics shared by the extraction families

use once_cell::sync::Lazy;
use regex_lite::Regex;

const SURNAME: &str = r"[A-Z\x{C0}-\x{DE}][A-Za-z\x{C0}-\x{24F}'\-]+";
const INITIALS: &str = r"[A-Z]\.(?:\s?-?[A-Z]\.)*";
const YEAR: &str = r"\((\d{4})[a-z]?\)";

/// (a) `Surname et al. (YEAR)`
pub static ET_AL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({SURNAME})\s+et\s+al\.?,?\s*{YEAR}")).expect("valid regex")
});

/// (b) `Surname, A. (YEAR)`
pub static SINGLE_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"({SURNAME}),\s+{INITIALS}\s*{YEAR}")).expect("valid regex")
});

/// (c) `Surname, A. and Surname, B. (YEAR)` or with `&`
pub static TWO_AUTHOR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"({SURNAME}),\s+{INITIALS},?\s+(?:and|&)\s+{SURNAME},\s+{INITIALS}\s*{YEAR}"
    ))
    .expect("valid regex")
});

/// (d) reference-list entry marker at line start: `[12] ` or `12. `
pub static ENTRY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[(\d{1,3})\]|(\d{1,3})\.)\s+\S").expect("valid regex"));

/// Leading entry marker to strip from an entry body
pub static ENTRY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\[\d{1,3}\]|\d{1,3}\.)[\s,.:;\-]*").expect("valid regex"));

/// Inline bracketed marker inside whitespace-collapsed text
pub static INLINE_BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,3})\]\s+").expect("valid regex"));

/// Inline numbered marker inside whitespace-collapsed text
pub static INLINE_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)(\d{1,3})\.\s+[A-Z]").expect("valid regex"));

/// A line that is nothing but a reference section heading, optionally numbered
pub static HEADING_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(?:\d{1,2}|[IVX]{1,4})\.?\s+)?(?:References|REFERENCES|Bibliography|BIBLIOGRAPHY|Works Cited|WORKS CITED)\s*:?$",
    )
    .expect("valid regex")
});

/// Reference section heading
pub static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:References|REFERENCES|Bibliography|BIBLIOGRAPHY)\b:?").expect("valid regex")
});

pub static QUOTED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["\x{201C}]([^"\x{201C}\x{201D}]{3,300})["\x{201D}]"#).expect("valid regex")
});

pub static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>,;]+"#).expect("valid regex"));

pub static PAREN_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d{4})[a-z]?\)").expect("valid regex"));

pub static BARE_YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})[a-z]?\b").expect("valid regex"));

/// Titles and surnames that point inside a document rather than at one
const NON_DOCUMENT_MARKERS: &[&str] = &[
    "see figure",
    "figure",
    "fig.",
    "table",
    "correction",
    "erratum",
    "appendix",
    "section",
    "equation",
];

/// Words ignored when judging whether a clause is title-cased
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "of", "on", "or", "the",
    "to", "via", "with", "without",
];

/// True when `text` equals or starts with a non-document marker
pub fn is_non_document_marker(text: &str) -> bool {
    let lowered = text.trim().to_lowercase();
    NON_DOCUMENT_MARKERS.iter().any(|marker| {
        let bare = marker.trim_end_matches('.');
        if lowered == *marker || lowered == bare {
            return true;
        }
        lowered
            .strip_prefix(bare)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|next| !next.is_alphabetic())
    })
}

/// At least two words, first capitalized, at least half the significant words capitalized
pub fn is_title_cased(clause: &str) -> bool {
    let words: Vec<&str> = clause
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();
    if words.len() < 2 {
        return false;
    }
    if !words[0].chars().next().is_some_and(char::is_uppercase) {
        return false;
    }

    let significant: Vec<&&str> = words
        .iter()
        .filter(|w| !MINOR_WORDS.contains(&w.to_lowercase().as_str()))
        .collect();
    if significant.is_empty() {
        return false;
    }
    let capitalized = significant
        .iter()
        .filter(|w| w.chars().next().is_some_and(|c| c.is_uppercase() || c.is_ascii_digit()))
        .count();
    capitalized * 2 >= significant.len()
}

/// True when `text` holds an in-text citation of any family
pub fn contains_in_text_citation(text: &str) -> bool {
    ET_AL_RE.is_match(text) || SINGLE_AUTHOR_RE.is_match(text) || TWO_AUTHOR_RE.is_match(text)
}

/// Number of a reference-list entry line, `[12] ...` or `12. ...`
pub fn entry_number(line: &str) -> Option<u32> {
    let caps = ENTRY_LINE_RE.captures(line)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

/// Text up to the first clause terminator, trimmed
pub fn leading_clause(text: &str) -> &str {
    let text = text.trim_start_matches(|c: char| c.is_whitespace() || ",.:;-\u{2013}".contains(c));
    let end = text
        .char_indices()
        .find(|&(i, c)| match c {
            ';' | '?' | '!' | '(' | '\n' => true,
            '.' => text[i + 1..].chars().next().map_or(true, char::is_whitespace),
            _ => false,
        })
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    text[..end].trim()
}

/// First DOI in `text`, without trailing punctuation
pub fn find_doi(text: &str) -> Option<String> {
    DOI_RE
        .find(text)
        .map(|m| m.as_str().trim_end_matches(['.', ')', ']']).to_string())
}

/// Slice of at most `chars` characters starting at byte `from`
pub fn char_window(text: &str, from: usize, chars: usize) -> &str {
    let rest = &text[from..];
    match rest.char_indices().nth(chars) {
        Some((end, _)) => &rest[..end],
        None => rest,
    }
}

/// First author surname from a free-text author list
pub fn first_surname(authors: &str) -> Option<String> {
    authors
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-'))
        .find(|token| {
            token.chars().filter(|c| c.is_alphabetic()).count() >= 2
                && token.chars().next().is_some_and(char::is_uppercase)
                && !token.contains('.')
        })
        .map(str::to_string)
}
