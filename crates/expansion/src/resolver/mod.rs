//! Entity resolver
//!
//! Decides whether a citation candidate names a document the graph already
//! knows. The cascade is strictly ordered and stops at the first hit:
//! in-flight map, exact title, fuzzy title + surname, surname + year.
//! The resolver only reads; it never creates or mutates nodes.

pub mod normalize;

use crate::parser::CitationCandidate;
use dashmap::DashMap;
use normalize::{is_comparable, jaccard, normalize_surname, normalize_title, token_overlap};
use refgraph_common::config::ResolverConfig;
use refgraph_common::{DocumentId, DocumentNode, GraphStore, Result, Signature};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::{debug, instrument};

/// Which cascade step produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    /// Materialized earlier in the same run
    InFlight,
    ExactTitle,
    TitleAndAuthor,
    AuthorAndYear,
    /// Same raw-text signature (no usable title, author or year)
    ExactSignature,
}

impl MatchRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchRule::InFlight => "in_flight",
            MatchRule::ExactTitle => "exact_title",
            MatchRule::TitleAndAuthor => "title_and_author",
            MatchRule::AuthorAndYear => "author_and_year",
            MatchRule::ExactSignature => "exact_signature",
        }
    }
}

/// Outcome of resolving one candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Existing { id: DocumentId, rule: MatchRule },
    New { signature: Signature },
}

/// Normalized view of a candidate used by every cascade step
#[derive(Debug, Clone)]
pub struct CandidateKey {
    pub signature: Signature,
    pub title: String,
    pub comparable: bool,
    pub surname: Option<String>,
    pub year: Option<i32>,
    pub context: String,
}

impl CandidateKey {
    pub fn new(candidate: &CitationCandidate, config: &ResolverConfig) -> Self {
        let title = normalize_title(&candidate.title);
        let surname = candidate
            .surname
            .as_deref()
            .map(normalize_surname)
            .filter(|s| !s.is_empty());
        Self {
            signature: normalize::signature(
                &candidate.title,
                surname.as_deref(),
                candidate.year,
                &candidate.raw_text,
                config.min_comparable_title_tokens,
            ),
            comparable: is_comparable(&title, config.min_comparable_title_tokens),
            title,
            surname,
            year: candidate.year,
            context: candidate.context.clone(),
        }
    }
}

/// What the cascade needs to know about a known document
#[derive(Debug, Clone)]
struct KnownDoc {
    id: DocumentId,
    title: String,
    surname: Option<String>,
    year: Option<i32>,
    /// Creation order; timestamps for stored nodes, sequence numbers in flight
    created: i64,
}

impl From<&DocumentNode> for KnownDoc {
    fn from(node: &DocumentNode) -> Self {
        Self {
            id: node.id,
            title: node.title.clone(),
            surname: node.surname.clone(),
            year: node.year,
            created: node.created_at.timestamp_micros(),
        }
    }
}

/// Per-run map of nodes materialized during the run
#[derive(Debug, Default)]
pub struct InFlightMap {
    entries: DashMap<Signature, KnownDoc>,
    seq: AtomicU64,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node under the signature it was resolved with
    pub fn insert(&self, signature: Signature, node: &DocumentNode) {
        let seq = self.seq.fetch_add(1, AtomicOrdering::SeqCst) as i64;
        let mut known = KnownDoc::from(node);
        known.created = seq;
        self.entries.entry(signature).or_insert(known);
    }

    pub fn get(&self, signature: &Signature) -> Option<DocumentId> {
        self.entries.get(signature).map(|e| e.id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn snapshot(&self) -> Vec<KnownDoc> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

/// Strictly ordered resolution cascade
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    config: ResolverConfig,
}

impl EntityResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn key(&self, candidate: &CitationCandidate) -> CandidateKey {
        CandidateKey::new(candidate, &self.config)
    }

    /// Resolve a candidate against the in-flight map, then the store
    #[instrument(skip_all, fields(raw = %candidate.raw_text))]
    pub async fn resolve(
        &self,
        candidate: &CitationCandidate,
        store: &dyn GraphStore,
        in_flight: &InFlightMap,
    ) -> Result<Resolution> {
        let key = self.key(candidate);
        let resolution = self.resolve_key(&key, store, in_flight).await?;
        match &resolution {
            Resolution::Existing { id, rule } => {
                debug!(document_id = %id, rule = rule.as_str(), "Candidate matched existing document")
            }
            Resolution::New { signature } => debug!(%signature, "Candidate is new"),
        }
        Ok(resolution)
    }

    pub async fn resolve_key(
        &self,
        key: &CandidateKey,
        store: &dyn GraphStore,
        in_flight: &InFlightMap,
    ) -> Result<Resolution> {
        // 0. in-flight: same signature, then the cascade over in-flight entries
        if let Some(id) = in_flight.get(&key.signature) {
            return Ok(Resolution::Existing { id, rule: MatchRule::InFlight });
        }
        if !in_flight.is_empty() {
            if let Some(id) = self.match_known(key, &in_flight.snapshot()).map(|(id, _)| id) {
                return Ok(Resolution::Existing { id, rule: MatchRule::InFlight });
            }
        }

        // 1. exact signature (exact normalized title for titled candidates)
        if let Some(node) = store.find(&key.signature).await? {
            let rule = match key.signature.as_str() {
                s if s.starts_with("title:") => MatchRule::ExactTitle,
                s if s.starts_with("author:") => MatchRule::AuthorAndYear,
                _ => MatchRule::ExactSignature,
            };
            return Ok(Resolution::Existing { id: node.id, rule });
        }

        // 2./3. surname-indexed fuzzy steps
        if let Some(surname) = key.surname.as_deref() {
            let known: Vec<KnownDoc> = store
                .find_by_surname(surname)
                .await?
                .iter()
                .map(KnownDoc::from)
                .collect();
            if let Some((id, rule)) = self.match_known(key, &known) {
                return Ok(Resolution::Existing { id, rule });
            }
        }

        Ok(Resolution::New { signature: key.signature.clone() })
    }

    /// Steps 1-3 over an explicit set of documents
    fn match_known(&self, key: &CandidateKey, known: &[KnownDoc]) -> Option<(DocumentId, MatchRule)> {
        if key.comparable {
            // 1. exact normalized title
            if let Some(doc) = earliest(known.iter().filter(|d| normalize_title(&d.title) == key.title)) {
                return Some((doc.id, MatchRule::ExactTitle));
            }

            // 2. title similarity + surname
            let surname = key.surname.as_deref()?;
            let best = known
                .iter()
                .filter(|d| d.surname.as_deref() == Some(surname))
                .filter_map(|d| {
                    let title = normalize_title(&d.title);
                    if !is_comparable(&title, self.config.min_comparable_title_tokens) {
                        return None;
                    }
                    let score = jaccard(&title, &key.title);
                    (score >= self.config.title_similarity_threshold).then_some((d, score))
                })
                .max_by(|(a, sa), (b, sb)| {
                    sa.partial_cmp(sb)
                        .unwrap_or(Ordering::Equal)
                        .then_with(|| creation_order(b, a))
                });
            return best.map(|(d, _)| (d.id, MatchRule::TitleAndAuthor));
        }

        // 3. surname + year when the title cannot be compared
        let (surname, year) = (key.surname.as_deref()?, key.year?);
        known
            .iter()
            .filter(|d| d.surname.as_deref() == Some(surname) && d.year == Some(year))
            .max_by(|a, b| {
                token_overlap(&a.title, &key.context)
                    .cmp(&token_overlap(&b.title, &key.context))
                    .then_with(|| creation_order(b, a))
            })
            .map(|d| (d.id, MatchRule::AuthorAndYear))
    }
}

fn creation_order(a: &KnownDoc, b: &KnownDoc) -> Ordering {
    a.created.cmp(&b.created).then(a.id.cmp(&b.id))
}

fn earliest<'a>(docs: impl Iterator<Item = &'a KnownDoc>) -> Option<&'a KnownDoc> {
    docs.min_by(|a, b| creation_order(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{CitationFamily, ConfidenceSignals};
    use refgraph_common::{DocumentDraft, InMemoryGraphStore};

    fn candidate(title: &str, surname: &str, year: i32, context: &str) -> CitationCandidate {
        CitationCandidate {
            raw_text: format!("{}, A. ({})", surname, year),
            author: format!("{}, A.", surname),
            surname: Some(surname.to_string()),
            year: Some(year),
            title: title.to_string(),
            doi: None,
            context: context.to_string(),
            family: CitationFamily::SingleAuthor,
            position: 0,
            signals: ConfidenceSignals::default(),
        }
    }

    async fn seed(store: &InMemoryGraphStore, title: &str, surname: &str, year: i32) -> DocumentNode {
        let sig = normalize::signature(title, Some(surname), Some(year), title, 3);
        store
            .create_or_get(
                sig,
                DocumentDraft {
                    title: title.into(),
                    authors: surname.into(),
                    surname: Some(normalize_surname(surname)),
                    year: Some(year),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .into_node()
    }

    #[tokio::test]
    async fn test_exact_title_match() {
        let store = InMemoryGraphStore::new();
        let node = seed(&store, "Deep Learning for Citation Graphs", "Smith", 2020).await;
        let resolver = EntityResolver::default();

        let c = candidate("Deep learning for citation graphs.", "Smith", 2020, "");
        let res = resolver.resolve(&c, &store, &InFlightMap::new()).await.unwrap();
        assert_eq!(res, Resolution::Existing { id: node.id, rule: MatchRule::ExactTitle });
    }

    #[tokio::test]
    async fn test_fuzzy_title_requires_surname() {
        let store = InMemoryGraphStore::new();
        let node = seed(&store, "Graph neural networks for citation recommendation", "Smith", 2020).await;
        let resolver = EntityResolver::default();
        let in_flight = InFlightMap::new();

        // 5 of 6 tokens shared: jaccard 5/6
        let close = candidate("Graph neural networks for citation", "Smith", 2020, "");
        assert_eq!(
            resolver.resolve(&close, &store, &in_flight).await.unwrap(),
            Resolution::Existing { id: node.id, rule: MatchRule::TitleAndAuthor }
        );

        let other_author = candidate("Graph neural networks for citation", "Jones", 2020, "");
        assert!(matches!(
            resolver.resolve(&other_author, &store, &in_flight).await.unwrap(),
            Resolution::New { .. }
        ));
    }

    #[tokio::test]
    async fn test_author_year_tie_break_by_context() {
        let store = InMemoryGraphStore::new();
        let _first = seed(&store, "Protein folding with transformers", "Smith", 2020).await;
        let second = seed(&store, "Citation graphs at web scale", "Smith", 2020).await;
        let resolver = EntityResolver::default();

        let c = candidate("", "Smith", 2020, "Smith, A. (2020) built citation graphs for the web.");
        assert_eq!(
            resolver.resolve(&c, &store, &InFlightMap::new()).await.unwrap(),
            Resolution::Existing { id: second.id, rule: MatchRule::AuthorAndYear }
        );
    }

    #[tokio::test]
    async fn test_new_candidate_and_idempotence() {
        let store = InMemoryGraphStore::new();
        let resolver = EntityResolver::default();
        let in_flight = InFlightMap::new();
        let c = candidate("", "Jones", 2019, "");

        let first = resolver.resolve(&c, &store, &in_flight).await.unwrap();
        let second = resolver.resolve(&c, &store, &in_flight).await.unwrap();
        assert_eq!(first, Resolution::New { signature: Signature::new("author:jones:2019") });
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_in_flight_consulted_first() {
        let store = InMemoryGraphStore::new();
        let node = seed(&store, "Deep Learning for Citation Graphs", "Smith", 2020).await;
        let resolver = EntityResolver::default();
        let in_flight = InFlightMap::new();
        in_flight.insert(node.signature.clone(), &node);

        let c = candidate("Deep Learning for Citation Graphs", "Smith", 2020, "");
        assert_eq!(
            resolver.resolve(&c, &store, &in_flight).await.unwrap(),
            Resolution::Existing { id: node.id, rule: MatchRule::InFlight }
        );
    }
}
