//! Seed registration
//!
//! Registers a user-supplied document as an `uploaded` node with content.
//! An upload whose signature matches an existing stub upgrades that stub.

use crate::errors::{ExpansionError, Result};
use crate::resolver::normalize::{normalize_surname, signature};
use crate::sources::extract::{normalize_text, pdf_to_text_blocking};
use refgraph_common::config::ResolverConfig;
use refgraph_common::{
    ContentState, ContentUpgrade, CreateOutcome, DocumentDraft, DocumentNode, GraphStore, Origin,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, instrument};

/// Characters of leading content used as the signature when there is no title
const RAW_SIGNATURE_CHARS: usize = 200;
const MAX_TITLE_CHARS: usize = 300;

/// A document supplied by a user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeedDocument {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub authors: String,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub content: String,
}

impl SeedDocument {
    /// Seed from plain text; the first non-empty line becomes the title
    pub fn from_text(text: &str) -> Self {
        let content = normalize_text(text);
        let title = content
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(|line| line.chars().take(MAX_TITLE_CHARS).collect::<String>())
            .unwrap_or_default();
        Self {
            title,
            content,
            ..Default::default()
        }
    }

    /// Load a `.txt`/`.md` or `.pdf` file
    pub async fn from_file(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let unsupported = |reason: &str| ExpansionError::UnsupportedSeed {
            path: path.display().to_string(),
            reason: reason.to_string(),
        };

        let text = match extension.as_str() {
            "txt" | "text" | "md" => tokio::fs::read_to_string(path).await?,
            "pdf" => {
                let bytes = tokio::fs::read(path).await?;
                pdf_to_text_blocking(bytes).await?
            }
            _ => return Err(unsupported("expected a .txt, .md or .pdf file")),
        };

        let seed = Self::from_text(&text);
        if seed.content.is_empty() {
            return Err(unsupported("no text could be extracted"));
        }
        Ok(seed)
    }

    fn draft(&self) -> DocumentDraft {
        DocumentDraft {
            title: self.title.trim().to_string(),
            authors: self.authors.trim().to_string(),
            surname: first_author_surname(&self.authors),
            year: self.year,
            abstract_text: self.abstract_text.clone(),
            content: Some(self.content.clone()),
            content_state: ContentState::HasContent,
            origin: Origin::Uploaded,
            acquisition_source: None,
            doi: self.doi.clone(),
            journal: self.journal.clone(),
        }
    }
}

/// Outcome of registering a seed
#[derive(Debug, Clone)]
pub struct SeedRegistration {
    pub node: DocumentNode,
    pub created: bool,
    /// An existing stub received this content
    pub upgraded: bool,
}

/// Create (or upgrade) the node for an uploaded document
#[instrument(skip_all, fields(title = %seed.title))]
pub async fn register_seed(
    store: &dyn GraphStore,
    seed: SeedDocument,
    config: &ResolverConfig,
) -> Result<SeedRegistration> {
    if seed.content.trim().is_empty() {
        return Err(ExpansionError::InvalidRequest("seed content is empty".into()));
    }

    let draft = seed.draft();
    let raw: String = seed.content.chars().take(RAW_SIGNATURE_CHARS).collect();
    let signature = signature(
        &draft.title,
        draft.surname.as_deref(),
        draft.year,
        &raw,
        config.min_comparable_title_tokens,
    );
    let upgrade = ContentUpgrade::from_draft(&draft);

    let registration = match store.create_or_get(signature, draft).await? {
        CreateOutcome::Created(node) => SeedRegistration {
            node,
            created: true,
            upgraded: false,
        },
        CreateOutcome::Existing(node) => match upgrade {
            Some(upgrade) if node.is_stub() => SeedRegistration {
                node: store.attach_content(node.id, upgrade).await?,
                created: false,
                upgraded: true,
            },
            _ => SeedRegistration {
                node,
                created: false,
                upgraded: false,
            },
        },
    };

    info!(
        document_id = %registration.node.id,
        created = registration.created,
        upgraded = registration.upgraded,
        "Seed registered"
    );
    Ok(registration)
}

/// Lower-cased surname of the first listed author
pub fn first_author_surname(authors: &str) -> Option<String> {
    let first = authors
        .split(|c: char| c == ';' || c == '&')
        .next()?
        .split(" and ")
        .next()?
        .trim();
    let first = first.strip_suffix("et al.").unwrap_or(first).trim();

    let surname = match first.split_once(',') {
        Some((surname, _)) => surname.trim(),
        None => first.split_whitespace().last()?,
    };
    Some(normalize_surname(surname)).filter(|s| !s.is_empty())
}
