//! Citation parser
//!
//! Turns raw document text into a lazy stream of [`CitationCandidate`]s. The
//! text is scanned paragraph by paragraph; prose is split into sentences and
//! matched against three in-text families, reference-list entries are parsed
//! as a unit. Candidates come out in document order and are never deduplicated.

mod entries;
mod patterns;
mod sentences;

use crate::errors::{ExpansionError, Result};
use chrono::Datelike;
use entries::{parse_entry, segment_paragraph, Unit};
use patterns::{
    char_window, contains_in_text_citation, find_doi, is_non_document_marker, is_title_cased,
    leading_clause, ET_AL_RE, QUOTED_RE, SINGLE_AUTHOR_RE, TWO_AUTHOR_RE,
};
use refgraph_common::config::CitationConfig;
use regex_lite::Regex;
use sentences::sentence_spans;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::Lines;

/// Which pattern produced a candidate, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationFamily {
    /// `Surname et al. (YEAR)`
    EtAl,
    /// `Surname, A. (YEAR)`
    SingleAuthor,
    /// `Surname, A. and Surname, B. (YEAR)`
    TwoAuthors,
    /// Numbered or bracketed reference-list entry
    ReferenceEntry,
}

/// Evidence that the extracted fields are trustworthy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceSignals {
    pub quoted_title: bool,
    pub title_cased: bool,
    pub reference_entry: bool,
}

/// An unresolved citation mention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationCandidate {
    /// Matched text as it appears in the document
    pub raw_text: String,
    /// Author clause as written
    pub author: String,
    /// First-author surname as written
    pub surname: Option<String>,
    pub year: Option<i32>,
    /// Empty when no title could be found
    pub title: String,
    pub doi: Option<String>,
    /// Surrounding sentences (or the whole entry)
    pub context: String,
    pub family: CitationFamily,
    /// Ordinal in the document, starting at 0
    pub position: usize,
    pub signals: ConfidenceSignals,
}

/// Extracts citation candidates from text
#[derive(Debug, Clone, Default)]
pub struct CitationParser {
    config: CitationConfig,
}

impl CitationParser {
    pub fn new(config: CitationConfig) -> Self {
        Self { config }
    }

    /// Validate `text` and return a lazy candidate iterator over it.
    /// Each call starts a fresh scan.
    pub fn parse<'a>(&'a self, text: &'a str) -> Result<Candidates<'a>> {
        validate_input(text)?;
        Ok(Candidates {
            parser: self,
            lines: text.lines(),
            units: VecDeque::new(),
            buffer: VecDeque::new(),
            position: 0,
            max_year: chrono::Utc::now().year() + 1,
            in_references: false,
        })
    }

    /// Eagerly collect every candidate
    pub fn parse_all(&self, text: &str) -> Result<Vec<CitationCandidate>> {
        Ok(self.parse(text)?.collect())
    }
}

/// Reject input that is empty or looks binary
fn validate_input(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(ExpansionError::ParseValidation("document text is empty".into()));
    }

    let total = text.chars().count();
    let control = text
        .chars()
        .filter(|c| c.is_control() && !c.is_whitespace())
        .count();
    if control * 10 > total {
        return Err(ExpansionError::ParseValidation(format!(
            "document looks binary ({} of {} characters are control characters)",
            control, total
        )));
    }
    Ok(())
}

/// Lazy, finite iterator over the candidates of one document
pub struct Candidates<'a> {
    parser: &'a CitationParser,
    lines: Lines<'a>,
    units: VecDeque<Unit>,
    buffer: VecDeque<CitationCandidate>,
    position: usize,
    max_year: i32,
    /// A reference section heading has been seen
    in_references: bool,
}

impl Iterator for Candidates<'_> {
    type Item = CitationCandidate;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(candidate) = self.buffer.pop_front() {
                return Some(candidate);
            }
            if let Some(unit) = self.units.pop_front() {
                self.extract(unit);
                continue;
            }
            let paragraph = self.next_paragraph()?;
            self.units
                .extend(segment_paragraph(&paragraph, &mut self.in_references));
        }
    }
}

/// A single in-text match before validation
struct ProseMatch {
    start: usize,
    end: usize,
    family: CitationFamily,
    surname: String,
    year: Option<i32>,
}

impl<'a> Candidates<'a> {
    /// Lines up to the next blank line; `None` once the text is exhausted
    fn next_paragraph(&mut self) -> Option<Vec<&'a str>> {
        let mut paragraph = Vec::new();
        for line in self.lines.by_ref() {
            if line.trim().is_empty() {
                if paragraph.is_empty() {
                    continue;
                }
                return Some(paragraph);
            }
            paragraph.push(line);
        }
        if paragraph.is_empty() {
            None
        } else {
            Some(paragraph)
        }
    }

    fn extract(&mut self, unit: Unit) {
        match unit {
            Unit::Prose(text) => self.extract_prose(&text),
            Unit::Entry(text) => self.extract_entry(&text),
        }
    }

    fn extract_prose(&mut self, text: &str) {
        let config = &self.parser.config;
        let spans = sentence_spans(text);

        let matches: Vec<(usize, ProseMatch)> = spans
            .iter()
            .enumerate()
            .flat_map(|(index, &(s_start, s_end))| {
                select_matches(&text[s_start..s_end])
                    .into_iter()
                    .map(move |m| (index, m.shifted(s_start)))
            })
            .collect();

        let mut candidates = Vec::with_capacity(matches.len());
        for (i, (index, m)) in matches.iter().enumerate() {
            let raw_text = text[m.start..m.end].to_string();
            let author = raw_text
                .rfind('(')
                .map(|paren| raw_text[..paren].trim().trim_end_matches(',').trim())
                .unwrap_or(&raw_text)
                .to_string();

            // the title window never reaches into the next citation
            let window_end = matches.get(i + 1).map_or(text.len(), |(_, next)| next.start);
            let window = char_window(&text[..window_end], m.end, config.title_window_chars);
            let mut signals = ConfidenceSignals::default();
            let title = match QUOTED_RE.captures(window) {
                Some(caps) if !contains_in_text_citation(&caps[1]) => {
                    signals.quoted_title = true;
                    caps[1].trim().trim_end_matches([',', '.']).to_string()
                }
                Some(_) => String::new(),
                None => {
                    let clause = leading_clause(window);
                    if is_title_cased(clause) && !contains_in_text_citation(clause) {
                        signals.title_cased = true;
                        clause.to_string()
                    } else {
                        String::new()
                    }
                }
            };

            let from = index.saturating_sub(config.context_sentences);
            let to = (index + config.context_sentences).min(spans.len() - 1);
            let context = text[spans[from].0..spans[to].1].to_string();

            candidates.push(CitationCandidate {
                raw_text,
                author,
                surname: Some(m.surname.clone()),
                year: m.year,
                title,
                doi: find_doi(window),
                context,
                family: m.family,
                position: 0,
                signals,
            });
        }

        for candidate in candidates {
            self.accept(candidate);
        }
    }

    fn extract_entry(&mut self, text: &str) {
        let parts = parse_entry(text);
        let candidate = CitationCandidate {
            raw_text: text.to_string(),
            author: parts.authors,
            surname: parts.surname,
            year: parts.year,
            title: parts.title,
            doi: parts.doi,
            context: text.to_string(),
            family: CitationFamily::ReferenceEntry,
            position: 0,
            signals: ConfidenceSignals {
                quoted_title: parts.quoted_title,
                title_cased: false,
                reference_entry: true,
            },
        };
        self.accept(candidate);
    }

    fn accept(&mut self, mut candidate: CitationCandidate) {
        if !self.is_valid(&candidate) {
            tracing::trace!(raw = %candidate.raw_text, "Dropped citation match");
            return;
        }
        candidate.position = self.position;
        self.position += 1;
        self.buffer.push_back(candidate);
    }

    fn is_valid(&self, candidate: &CitationCandidate) -> bool {
        let config = &self.parser.config;
        let title_len = candidate.title.chars().count();

        if title_len > 0 && title_len < config.min_title_chars {
            return false;
        }
        if candidate.author.trim().chars().count() < config.min_author_chars {
            return false;
        }
        match candidate.year {
            Some(year) if year < config.min_year || year > self.max_year => return false,
            None if candidate.family != CitationFamily::ReferenceEntry || title_len == 0 => {
                return false
            }
            _ => {}
        }
        if candidate.surname.as_deref().is_some_and(is_non_document_marker)
            || (title_len > 0 && is_non_document_marker(&candidate.title))
        {
            return false;
        }
        true
    }
}

impl ProseMatch {
    fn shifted(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            ..self
        }
    }
}

/// All in-text matches in a sentence; overlaps resolved by earliest start,
/// then longest span, then family priority
fn select_matches(sentence: &str) -> Vec<ProseMatch> {
    let families: [(&Regex, CitationFamily); 3] = [
        (&*ET_AL_RE, CitationFamily::EtAl),
        (&*SINGLE_AUTHOR_RE, CitationFamily::SingleAuthor),
        (&*TWO_AUTHOR_RE, CitationFamily::TwoAuthors),
    ];

    let mut found: Vec<ProseMatch> = Vec::new();
    for (re, family) in families {
        for caps in re.captures_iter(sentence) {
            let (Some(whole), Some(surname), Some(year)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            found.push(ProseMatch {
                start: whole.start(),
                end: whole.end(),
                family,
                surname: surname.as_str().to_string(),
                year: year.as_str().parse().ok(),
            });
        }
    }

    found.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then((b.end - b.start).cmp(&(a.end - a.start)))
            .then(a.family.cmp(&b.family))
    });

    let mut selected: Vec<ProseMatch> = Vec::new();
    for m in found {
        if selected.last().map_or(true, |last| m.start >= last.end) {
            selected.push(m);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CitationParser {
        CitationParser::new(CitationConfig::default())
    }

    #[test]
    fn test_in_text_families() {
        let text = "Prior work by Smith, J. (2020) established the baseline. \
                    Jones et al. (2019) extended it to graphs.";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].raw_text, "Smith, J. (2020)");
        assert_eq!(candidates[0].family, CitationFamily::SingleAuthor);
        assert_eq!(candidates[0].surname.as_deref(), Some("Smith"));
        assert_eq!(candidates[0].year, Some(2020));
        assert!(candidates[0].title.is_empty());
        assert_eq!(candidates[1].raw_text, "Jones et al. (2019)");
        assert_eq!(candidates[1].author, "Jones et al.");
        assert_eq!(candidates[1].position, 1);
    }

    #[test]
    fn test_numbered_heading_keeps_in_text_citations() {
        let text = "1. Introduction\n\
                    Prior work by Smith, J. (2020) established the baseline.\n\
                    Jones et al. (2019) extended it to graphs.";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.family != CitationFamily::ReferenceEntry));
        assert_eq!(candidates[0].raw_text, "Smith, J. (2020)");
        assert_eq!(candidates[0].author, "Smith, J.");
        assert_eq!(candidates[1].raw_text, "Jones et al. (2019)");
        assert!(candidates.iter().all(|c| c.title.is_empty()));
    }

    #[test]
    fn test_title_stops_at_next_citation() {
        let text = "... as shown by Smith, J. (2020). ... Also Jones et al. (2019) found that ...";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].surname.as_deref(), Some("Smith"));
        assert_eq!(candidates[0].year, Some(2020));
        assert_eq!(candidates[0].title, "");
        assert_eq!(candidates[1].surname.as_deref(), Some("Jones"));
        assert_eq!(candidates[1].year, Some(2019));
        assert_eq!(candidates[1].title, "");
    }

    #[test]
    fn test_quoted_title_with_citation_is_rejected() {
        let text = "Compare Lee et al. (2009), \"as argued in Smith, J. (2020) before\", here.";
        let candidates = parser().parse_all(text).unwrap();
        assert!(candidates.iter().all(|c| !c.signals.quoted_title));
    }

    #[test]
    fn test_two_author_match_wins_overlap() {
        let text = "This follows Smith, J. and Doe, K. (2018) closely.";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].family, CitationFamily::TwoAuthors);
        assert_eq!(candidates[0].raw_text, "Smith, J. and Doe, K. (2018)");
    }

    #[test]
    fn test_title_cased_title_and_context() {
        let text = "We start here. As in Brown, T. (2020). Language Models Are Few-Shot Learners. \
                    Later work differs. Unrelated sentence.";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, "Language Models Are Few-Shot Learners");
        assert!(candidates[0].signals.title_cased);
        assert!(candidates[0].context.starts_with("We start here."));
        assert!(!candidates[0].context.contains("Unrelated"));
    }

    #[test]
    fn test_quoted_title() {
        let text = "Recall Lee et al. (2009), \"Sparse coding at scale\", for details.";
        let candidates = parser().parse_all(text).unwrap();
        assert_eq!(candidates[0].title, "Sparse coding at scale");
        assert!(candidates[0].signals.quoted_title);
    }

    #[test]
    fn test_validation_rules() {
        // year out of range, short title, figure marker
        let text = "Old work by Smith et al. (1850) is ignored. \
                    Jones et al. (2019) \"Short\" too. \
                    Table et al. (2020) is not a paper.";
        let candidates = parser().parse_all(text).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_reference_entries() {
        let text = "Body text.\n\nReferences\n\
                    [1] Smith, J. (2020). Deep learning for citation graphs.\n\
                    [2] Doe, K. Untitled notes without a year on parsing.\n\
                    [3] Li, X. (2017).\n";
        let candidates = parser().parse_all(text).unwrap();

        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.family == CitationFamily::ReferenceEntry));
        assert_eq!(candidates[0].title, "Deep learning for citation graphs");
        assert_eq!(candidates[1].year, None);
        assert!(!candidates[1].title.is_empty());
        assert_eq!(candidates[2].title, "");
        assert_eq!(candidates[2].context, "[3] Li, X. (2017).");
    }

    #[test]
    fn test_candidates_not_deduplicated() {
        let text = "Smith, J. (2020) said so. Smith, J. (2020) said it again.";
        let candidates = parser().parse_all(text).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].raw_text, candidates[1].raw_text);
    }

    #[test]
    fn test_parse_is_restartable() {
        let p = parser();
        let text = "Jones et al. (2019) and Smith, J. (2020) agree.";
        let first: Vec<_> = p.parse(text).unwrap().collect();
        let second: Vec<_> = p.parse(text).unwrap().collect();
        assert_eq!(first, second);
        assert_eq!(p.parse(text).unwrap().take(1).count(), 1);
    }

    #[test]
    fn test_rejects_empty_and_binary_input() {
        assert!(matches!(
            parser().parse("   \n "),
            Err(ExpansionError::ParseValidation(_))
        ));
        let binary: String = "\u{0}\u{1}\u{2}abc".repeat(10);
        assert!(matches!(
            parser().parse(&binary),
            Err(ExpansionError::ParseValidation(_))
        ));
    }

    #[test]
    fn test_no_citations_yields_empty() {
        assert_eq!(parser().parse_all("Plain prose without any references.").unwrap(), vec![]);
    }
}
