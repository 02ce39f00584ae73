//! Sentence segmentation for citation context

/// Tokens that end with a period without ending the sentence
const ABBREVIATIONS: &[&str] = &[
    "al", "e.g", "i.e", "fig", "figs", "eq", "eqs", "cf", "vs", "no", "vol", "pp", "p", "ch",
    "sec", "ref", "refs", "approx", "ed", "eds", "dr", "prof",
];

/// Byte spans of the sentences in `text`, in order
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut spans = Vec::new();
    let mut start = first_non_space(&chars, 0).map(|i| chars[i].0).unwrap_or(text.len());

    for (i, &(idx, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') || idx < start {
            continue;
        }
        match chars.get(i + 1) {
            Some(&(_, next)) if next.is_whitespace() => {}
            _ => continue,
        }
        let Some(j) = first_non_space(&chars, i + 1) else {
            continue;
        };
        let following = chars[j].1;
        if !(following.is_uppercase()
            || following.is_ascii_digit()
            || matches!(following, '"' | '\u{201C}' | '(' | '['))
        {
            continue;
        }
        if c == '.' && is_abbreviation(&text[start..idx]) {
            continue;
        }

        spans.push((start, idx + c.len_utf8()));
        start = chars[j].0;
    }

    let tail = text[start..].trim_end();
    if !tail.is_empty() {
        spans.push((start, start + tail.len()));
    }
    spans
}

fn first_non_space(chars: &[(usize, char)], from: usize) -> Option<usize> {
    (from..chars.len()).find(|&i| !chars[i].1.is_whitespace())
}

/// Whether the token right before a period is an initial or a known abbreviation
pub fn is_abbreviation(before: &str) -> bool {
    let token = before
        .rsplit(|c: char| c.is_whitespace() || c == '(' || c == '[')
        .next()
        .unwrap_or("");
    if token.is_empty() {
        return false;
    }

    // "J" or "J.K" style initials
    if token
        .split('.')
        .all(|part| part.chars().count() == 1 && part.chars().all(char::is_uppercase))
    {
        return true;
    }

    ABBREVIATIONS.contains(&token.to_lowercase().as_str())
}
