//! Document graph model
//!
//! Nodes are documents (uploaded seeds, acquired papers, or metadata-only stubs),
//! edges are citations found in a node's text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Stable identity of a document node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for DocumentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Normalized deduplication key (`title:...`, `author:...:year`, `raw:...`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Fixed-width SHA-256 hex digest, used as the unique database key
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether a node carries real text. Only moves `Stub -> HasContent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentState {
    Stub,
    HasContent,
}

impl ContentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentState::Stub => "stub",
            ContentState::HasContent => "has_content",
        }
    }
}

impl From<String> for ContentState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "has_content" => ContentState::HasContent,
            _ => ContentState::Stub,
        }
    }
}

/// How a node entered the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Submitted directly by a user
    Uploaded,
    /// Created by the acquisition coordinator after trying the providers
    Acquired,
    /// Created from a citation without any acquisition attempt
    Stub,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Uploaded => "uploaded",
            Origin::Acquired => "acquired",
            Origin::Stub => "stub",
        }
    }
}

impl From<String> for Origin {
    fn from(s: String) -> Self {
        match s.as_str() {
            "uploaded" => Origin::Uploaded,
            "acquired" => Origin::Acquired,
            _ => Origin::Stub,
        }
    }
}

/// External content providers, in default priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Arxiv,
    Doi,
    SemanticScholar,
    ResearchGate,
    GoogleScholar,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Arxiv,
        ProviderKind::Doi,
        ProviderKind::SemanticScholar,
        ProviderKind::ResearchGate,
        ProviderKind::GoogleScholar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Arxiv => "arxiv",
            ProviderKind::Doi => "doi",
            ProviderKind::SemanticScholar => "semantic_scholar",
            ProviderKind::ResearchGate => "research_gate",
            ProviderKind::GoogleScholar => "google_scholar",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown provider kind: {}", s))
    }
}

/// A document in the citation graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: DocumentId,
    pub signature: Signature,
    pub title: String,
    /// Free text, unnormalized
    pub authors: String,
    /// First-author surname, lower-cased
    pub surname: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub content: Option<String>,
    pub content_state: ContentState,
    pub origin: Origin,
    pub acquisition_source: Option<ProviderKind>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentNode {
    /// Build a fresh node from a draft
    pub fn from_draft(signature: Signature, draft: DocumentDraft) -> Self {
        let now = Utc::now();
        Self {
            id: DocumentId::new(),
            signature,
            title: draft.title,
            authors: draft.authors,
            surname: draft.surname,
            year: draft.year,
            abstract_text: draft.abstract_text,
            content: draft.content,
            content_state: draft.content_state,
            origin: draft.origin,
            acquisition_source: draft.acquisition_source,
            doi: draft.doi,
            journal: draft.journal,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.content_state == ContentState::Stub
    }

    /// Text the parser should read, if any
    pub fn parseable_text(&self) -> Option<&str> {
        match self.content_state {
            ContentState::HasContent => self.content.as_deref(),
            ContentState::Stub => None,
        }
    }

    /// Apply a content upgrade. Returns false when the node already has content.
    pub fn apply_upgrade(&mut self, upgrade: ContentUpgrade) -> bool {
        if self.content_state == ContentState::HasContent {
            return false;
        }

        self.content = Some(upgrade.content);
        self.content_state = ContentState::HasContent;
        self.origin = upgrade.origin;
        self.acquisition_source = upgrade.acquisition_source;

        if let Some(title) = upgrade.title.filter(|t| !t.trim().is_empty()) {
            self.title = title;
        }
        if let Some(authors) = upgrade.authors.filter(|a| !a.trim().is_empty()) {
            self.authors = authors;
        }
        self.year = upgrade.year.or(self.year);
        self.abstract_text = upgrade.abstract_text.or(self.abstract_text.take());
        self.doi = upgrade.doi.or(self.doi.take());
        self.journal = upgrade.journal.or(self.journal.take());
        self.updated_at = Utc::now();
        true
    }
}

/// Attributes for a node that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub title: String,
    pub authors: String,
    pub surname: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub content: Option<String>,
    pub content_state: ContentState,
    pub origin: Origin,
    pub acquisition_source: Option<ProviderKind>,
    pub doi: Option<String>,
    pub journal: Option<String>,
}

impl Default for ContentState {
    fn default() -> Self {
        ContentState::Stub
    }
}

impl Default for Origin {
    fn default() -> Self {
        Origin::Stub
    }
}

/// Content attached to an existing stub. Metadata fields overwrite only when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUpgrade {
    pub content: String,
    pub origin: Origin,
    pub acquisition_source: Option<ProviderKind>,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
}

impl ContentUpgrade {
    /// Upgrade from a draft that carries content
    pub fn from_draft(draft: &DocumentDraft) -> Option<Self> {
        if draft.content_state != ContentState::HasContent {
            return None;
        }
        let content = draft.content.clone()?;
        Some(Self {
            content,
            origin: draft.origin,
            acquisition_source: draft.acquisition_source,
            title: Some(draft.title.clone()),
            authors: Some(draft.authors.clone()),
            year: draft.year,
            abstract_text: draft.abstract_text.clone(),
            doi: draft.doi.clone(),
            journal: draft.journal.clone(),
        })
    }
}

/// Directed citation from `source_id` to `target_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEdge {
    pub id: Uuid,
    pub source_id: DocumentId,
    pub target_id: DocumentId,
    pub raw_text: String,
    pub context: String,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

/// Edge to be inserted; deduplicated on `(source_id, raw_text)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDraft {
    pub source_id: DocumentId,
    pub target_id: DocumentId,
    pub raw_text: String,
    pub context: String,
    pub depth: u32,
}

impl EdgeDraft {
    pub fn into_edge(self) -> CitationEdge {
        CitationEdge {
            id: Uuid::new_v4(),
            source_id: self.source_id,
            target_id: self.target_id,
            raw_text: self.raw_text,
            context: self.context,
            depth: self.depth,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_draft() -> DocumentDraft {
        DocumentDraft {
            title: "Deep residual learning".into(),
            authors: "He".into(),
            surname: Some("he".into()),
            year: Some(2016),
            content: Some("Citation placeholder".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_signature_digest_is_stable() {
        let a = Signature::new("title:deep residual learning");
        let b = Signature::new("title:deep residual learning");
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
        assert_ne!(a.digest(), Signature::new("title:other").digest());
    }

    #[test]
    fn test_upgrade_is_monotonic() {
        let mut node = DocumentNode::from_draft(Signature::new("title:x"), stub_draft());
        assert!(node.is_stub());
        assert!(node.parseable_text().is_none());

        let upgrade = ContentUpgrade {
            content: "full text".into(),
            origin: Origin::Acquired,
            acquisition_source: Some(ProviderKind::Arxiv),
            title: None,
            authors: None,
            year: None,
            abstract_text: None,
            doi: Some("10.1000/xyz".into()),
            journal: None,
        };
        assert!(node.apply_upgrade(upgrade.clone()));
        assert_eq!(node.content_state, ContentState::HasContent);
        assert_eq!(node.title, "Deep residual learning");
        assert_eq!(node.doi.as_deref(), Some("10.1000/xyz"));

        let second = ContentUpgrade {
            content: "other text".into(),
            ..upgrade
        };
        assert!(!node.apply_upgrade(second));
        assert_eq!(node.content.as_deref(), Some("full text"));
    }

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
        }
        assert!("bing".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_upgrade_from_stub_draft_is_none() {
        assert!(ContentUpgrade::from_draft(&stub_draft()).is_none());
    }
}
