//! Title/author normalization, token similarity and signatures

use refgraph_common::Signature;
use std::collections::HashSet;

/// Trailing noise removed from normalized titles
const STOP_SUFFIXES: &[&str] = &["arxiv preprint", "preprint", "et al", "in press"];

/// Lower-case, punctuation to space, collapsed whitespace, stop suffixes removed
pub fn normalize_title(title: &str) -> String {
    let mapped: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    let mut normalized = mapped.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let before = normalized.len();
        for suffix in STOP_SUFFIXES {
            if normalized == *suffix {
                normalized.clear();
            } else if let Some(stripped) = normalized.strip_suffix(&format!(" {}", suffix)) {
                normalized = stripped.to_string();
            }
        }
        if normalized.len() == before {
            return normalized;
        }
    }
}

/// Lower-cased surname with punctuation removed
pub fn normalize_surname(surname: &str) -> String {
    surname
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '\'')
        .collect::<String>()
        .to_lowercase()
}

/// Word tokens of an already normalized string
pub fn tokens(normalized: &str) -> HashSet<&str> {
    normalized.split_whitespace().collect()
}

/// Jaccard similarity of two normalized strings' token sets
pub fn jaccard(a: &str, b: &str) -> f64 {
    let (a, b) = (tokens(a), tokens(b));
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f64 / union as f64
}

/// Number of tokens shared between a title and free text, both normalized here
pub fn token_overlap(title: &str, text: &str) -> usize {
    let title = normalize_title(title);
    let text = normalize_title(text);
    let text_tokens = tokens(&text);
    tokens(&title)
        .into_iter()
        .filter(|t| t.len() > 2 && text_tokens.contains(t))
        .count()
}

/// Whether a normalized title has enough tokens for title matching
pub fn is_comparable(normalized_title: &str, min_tokens: usize) -> bool {
    normalized_title.split_whitespace().count() >= min_tokens
}

/// `title:<title>` when the title is comparable, else `author:<surname>:<year>`,
/// else `raw:<raw text>`
pub fn signature(
    title: &str,
    surname: Option<&str>,
    year: Option<i32>,
    raw_text: &str,
    min_tokens: usize,
) -> Signature {
    let title = normalize_title(title);
    if is_comparable(&title, min_tokens) {
        return Signature::new(format!("title:{}", title));
    }

    let surname = surname.map(normalize_surname).filter(|s| !s.is_empty());
    match (surname, year) {
        (Some(surname), Some(year)) => Signature::new(format!("author:{}:{}", surname, year)),
        _ => Signature::new(format!("raw:{}", normalize_title(raw_text))),
    }
}
