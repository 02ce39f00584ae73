//! Reference-list entries: paragraph segmentation and family (d) parsing

use super::patterns::{
    entry_number, find_doi, first_surname, leading_clause, BARE_YEAR_RE, ENTRY_LINE_RE,
    ENTRY_PREFIX_RE, HEADING_LINE_RE, HEADING_RE, INLINE_BRACKET_RE, INLINE_NUMBER_RE,
    PAREN_YEAR_RE, QUOTED_RE,
};
use super::sentences::is_abbreviation;

/// A unit of text handed to the extractors
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// Running text, scanned sentence by sentence
    Prose(String),
    /// One reference-list entry with continuation lines joined
    Entry(String),
}

/// Split a paragraph (its lines) into prose and reference entries.
///
/// Marker lines start entries only inside a reference section (`in_references`,
/// set by a heading line and kept for the rest of the document) or when the
/// paragraph itself reads as a numbered reference list.
pub fn segment_paragraph(lines: &[&str], in_references: &mut bool) -> Vec<Unit> {
    let mut units = Vec::new();
    let mut prose: Vec<&str> = Vec::new();
    let mut entry: Option<String> = None;
    let mut entries_allowed = *in_references || is_reference_run(lines);

    for line in lines {
        let line = line.trim();
        if HEADING_LINE_RE.is_match(line) {
            if let Some(done) = entry.take() {
                units.push(Unit::Entry(done));
            }
            prose.push(line);
            *in_references = true;
            entries_allowed = true;
        } else if entries_allowed && ENTRY_LINE_RE.is_match(line) {
            flush_prose(&mut prose, &mut units);
            if let Some(done) = entry.take() {
                units.push(Unit::Entry(done));
            }
            entry = Some(line.to_string());
        } else if let Some(current) = entry.as_mut() {
            current.push(' ');
            current.push_str(line);
        } else {
            prose.push(line);
        }
    }

    if let Some(done) = entry.take() {
        units.push(Unit::Entry(done));
    }
    flush_prose(&mut prose, &mut units);
    units
}

/// At least two sequentially numbered marker lines, making up half the
/// paragraph or more, each entry carrying a year
fn is_reference_run(lines: &[&str]) -> bool {
    let mut numbers = Vec::new();
    let mut entries: Vec<String> = Vec::new();
    for line in lines {
        let line = line.trim();
        match entry_number(line) {
            Some(number) => {
                numbers.push(number);
                entries.push(line.to_string());
            }
            None => match entries.last_mut() {
                Some(current) => {
                    current.push(' ');
                    current.push_str(line);
                }
                None => return false,
            },
        }
    }

    numbers.len() >= 2
        && numbers.len() * 2 >= lines.len()
        && numbers.windows(2).all(|pair| pair[1] == pair[0] + 1)
        && entries.iter().all(|entry| BARE_YEAR_RE.is_match(entry))
}

fn flush_prose(prose: &mut Vec<&str>, units: &mut Vec<Unit>) {
    if prose.is_empty() {
        return;
    }
    let text = prose.join(" ");
    prose.clear();
    units.extend(split_inline_references(&text));
}

/// Whitespace-collapsed text may carry a whole reference list after a heading
fn split_inline_references(text: &str) -> Vec<Unit> {
    let Some(heading) = HEADING_RE.find(text) else {
        return vec![Unit::Prose(text.to_string())];
    };
    let tail = &text[heading.end()..];

    let mut starts = sequential_markers(
        INLINE_BRACKET_RE
            .captures_iter(tail)
            .filter_map(|c| Some((c.get(0)?.start(), c[1].parse::<u32>().ok()?))),
    );
    if starts.is_empty() {
        starts = sequential_markers(
            INLINE_NUMBER_RE
                .captures_iter(tail)
                .filter_map(|c| Some((c.get(1)?.start(), c[1].parse::<u32>().ok()?))),
        );
    }
    if starts.is_empty() {
        return vec![Unit::Prose(text.to_string())];
    }

    let mut units = Vec::new();
    let before = text[..heading.start()].trim();
    if !before.is_empty() {
        units.push(Unit::Prose(before.to_string()));
    }
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(tail.len());
        let entry = tail[start..end].trim();
        if !entry.is_empty() {
            units.push(Unit::Entry(entry.to_string()));
        }
    }
    units
}

/// Keep markers whose numbers run consecutively from the first one
fn sequential_markers(markers: impl Iterator<Item = (usize, u32)>) -> Vec<usize> {
    let mut starts = Vec::new();
    let mut expected: Option<u32> = None;
    for (pos, number) in markers {
        if expected.map_or(true, |n| n == number) {
            starts.push(pos);
            expected = Some(number + 1);
        }
    }
    starts
}

/// Fields pulled out of one entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntryParts {
    pub authors: String,
    pub surname: Option<String>,
    pub year: Option<i32>,
    pub title: String,
    pub quoted_title: bool,
    pub doi: Option<String>,
}

/// Parse a reference entry: authors, year, then the title clause
pub fn parse_entry(entry: &str) -> EntryParts {
    let body = match ENTRY_PREFIX_RE.find(entry) {
        Some(prefix) => &entry[prefix.end()..],
        None => entry,
    };

    let paren_year = PAREN_YEAR_RE.captures(body);
    let author_end = author_segment_end(
        body,
        paren_year.as_ref().and_then(|c| c.get(0)).map(|m| m.start()),
    );
    let authors = body[..author_end]
        .trim()
        .trim_end_matches([',', ':', ';'])
        .trim()
        .to_string();

    let (year, title_start) = match paren_year.as_ref().and_then(|c| Some((c.get(0)?, c.get(1)?))) {
        Some((whole, digits)) => {
            let start = if whole.start() <= author_end + 3 {
                whole.end()
            } else {
                author_end
            };
            (digits.as_str().parse::<i32>().ok(), start)
        }
        None => (
            BARE_YEAR_RE
                .captures(&body[author_end..])
                .and_then(|c| c[1].parse::<i32>().ok()),
            author_end,
        ),
    };

    let (title, quoted_title) = match QUOTED_RE.captures(body) {
        Some(caps) => (clean_title(&caps[1]), true),
        None => (clean_title(leading_clause(&body[title_start..])), false),
    };

    EntryParts {
        surname: first_surname(&authors),
        authors,
        year,
        title,
        quoted_title,
        doi: find_doi(body),
    }
}

/// Authors run until the year in parentheses, a colon, a quote or the first real sentence end
fn author_segment_end(body: &str, paren_year: Option<usize>) -> usize {
    let mut end = paren_year.unwrap_or(body.len());
    for (i, c) in body.char_indices() {
        if i >= end {
            break;
        }
        let stop = match c {
            ':' | '"' | '\u{201C}' => true,
            '.' => {
                let rest = &body[i + 1..];
                let followed_by_space = rest.chars().next().map_or(true, char::is_whitespace);
                followed_by_space && (!is_abbreviation(&body[..i]) || title_follows(rest))
            }
            _ => false,
        };
        if stop {
            end = i;
            break;
        }
    }
    end
}

/// After an initial or "et al.", a capitalized word followed by a lowercase one starts the title
fn title_follows(rest: &str) -> bool {
    const CONNECTORS: &[&str] = &["and", "et", "van", "von", "de", "der", "den", "la", "le", "du", "da"];

    let mut tokens = rest.split_whitespace();
    let (Some(first), Some(second)) = (tokens.next(), tokens.next()) else {
        return false;
    };
    let plain_word = first.chars().next().is_some_and(char::is_uppercase)
        && first.chars().all(|c| c.is_alphabetic() || c == '-');
    plain_word
        && second.chars().next().is_some_and(char::is_lowercase)
        && !CONNECTORS.contains(&second)
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(|c: char| matches!(c, ',' | '.' | ';' | ':'))
        .trim()
        .to_string()
}
