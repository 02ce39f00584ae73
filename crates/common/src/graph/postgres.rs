//! PostgreSQL graph store over the SeaORM repository

use super::{CreateOutcome, GraphStore};
use crate::db::models::{CitationEdge as EdgeRow, Document};
use crate::db::{Repository, StubUpgradeRow};
use crate::errors::{AppError, Result};
use crate::models::{
    CitationEdge, ContentUpgrade, DocumentDraft, DocumentId, DocumentNode, EdgeDraft, Signature,
};
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Graph store persisted in the `documents` and `citation_edges` tables
#[derive(Clone)]
pub struct PgGraphStore {
    repo: Repository,
}

impl PgGraphStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }
}

impl From<Document> for DocumentNode {
    fn from(row: Document) -> Self {
        Self {
            id: DocumentId(row.id),
            signature: Signature::new(row.signature),
            title: row.title,
            authors: row.authors,
            surname: row.surname,
            year: row.year,
            abstract_text: row.abstract_text,
            content: row.content,
            content_state: row.content_state.into(),
            origin: row.origin.into(),
            acquisition_source: row.acquisition_source.and_then(|s| s.parse().ok()),
            doi: row.doi,
            journal: row.journal,
            created_at: row.created_at.with_timezone(&Utc),
            updated_at: row.updated_at.with_timezone(&Utc),
        }
    }
}

impl From<&DocumentNode> for Document {
    fn from(node: &DocumentNode) -> Self {
        Self {
            id: node.id.0,
            signature: node.signature.as_str().to_string(),
            signature_hash: node.signature.digest(),
            title: node.title.clone(),
            authors: node.authors.clone(),
            surname: node.surname.clone(),
            year: node.year,
            abstract_text: node.abstract_text.clone(),
            content: node.content.clone(),
            content_state: node.content_state.as_str().to_string(),
            origin: node.origin.as_str().to_string(),
            acquisition_source: node.acquisition_source.map(|k| k.as_str().to_string()),
            doi: node.doi.clone(),
            journal: node.journal.clone(),
            created_at: node.created_at.fixed_offset(),
            updated_at: node.updated_at.fixed_offset(),
        }
    }
}

impl From<EdgeRow> for CitationEdge {
    fn from(row: EdgeRow) -> Self {
        Self {
            id: row.id,
            source_id: DocumentId(row.source_id),
            target_id: DocumentId(row.target_id),
            raw_text: row.raw_text,
            context: row.context,
            depth: u32::try_from(row.depth).unwrap_or_default(),
            created_at: row.created_at.with_timezone(&Utc),
        }
    }
}

fn edge_row(edge: &CitationEdge) -> EdgeRow {
    EdgeRow {
        id: edge.id,
        source_id: edge.source_id.0,
        target_id: edge.target_id.0,
        raw_text: edge.raw_text.clone(),
        raw_text_hash: hex::encode(Sha256::digest(edge.raw_text.as_bytes())),
        context: edge.context.clone(),
        depth: i32::try_from(edge.depth).unwrap_or(i32::MAX),
        created_at: edge.created_at.fixed_offset(),
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn find(&self, signature: &Signature) -> Result<Option<DocumentNode>> {
        Ok(self
            .repo
            .find_document_by_signature_hash(&signature.digest(), false)
            .await?
            .map(Into::into))
    }

    async fn get(&self, id: DocumentId) -> Result<Option<DocumentNode>> {
        Ok(self.repo.find_document_by_id(id.0).await?.map(Into::into))
    }

    async fn find_by_surname(&self, surname: &str) -> Result<Vec<DocumentNode>> {
        Ok(self
            .repo
            .find_documents_by_surname(surname)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn create_or_get(
        &self,
        signature: Signature,
        draft: DocumentDraft,
    ) -> Result<CreateOutcome> {
        let node = DocumentNode::from_draft(signature, draft);
        let row = Document::from(&node);

        if self.repo.insert_document_if_absent(&row).await? {
            return Ok(CreateOutcome::Created(node));
        }

        debug!(signature = %node.signature, "Signature already stored");
        let existing = self
            .repo
            .find_document_by_signature_hash(&row.signature_hash, true)
            .await?
            .ok_or_else(|| AppError::Internal {
                message: format!("conflicting document for {} vanished", node.signature),
            })?;
        Ok(CreateOutcome::Existing(existing.into()))
    }

    async fn attach_content(
        &self,
        id: DocumentId,
        upgrade: ContentUpgrade,
    ) -> Result<DocumentNode> {
        let row = StubUpgradeRow {
            content: upgrade.content,
            origin: upgrade.origin.as_str().to_string(),
            acquisition_source: upgrade.acquisition_source.map(|k| k.as_str().to_string()),
            title: upgrade.title,
            authors: upgrade.authors,
            year: upgrade.year,
            abstract_text: upgrade.abstract_text,
            doi: upgrade.doi,
            journal: upgrade.journal,
        };
        let upgraded = self.repo.upgrade_stub(id.0, row).await?;
        debug!(document_id = %id, upgraded, "Attach content");

        self.repo
            .find_document_by_id_primary(id.0)
            .await?
            .map(Into::into)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
    }

    async fn add_edge(&self, edge: EdgeDraft) -> Result<Option<CitationEdge>> {
        let edge = edge.into_edge();
        if self.repo.insert_edge_if_absent(&edge_row(&edge)).await? {
            Ok(Some(edge))
        } else {
            Ok(None)
        }
    }

    async fn edges_from(&self, id: DocumentId) -> Result<Vec<CitationEdge>> {
        Ok(self
            .repo
            .edges_from(id.0)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn edges_to(&self, id: DocumentId) -> Result<Vec<CitationEdge>> {
        Ok(self
            .repo
            .edges_to(id.0)
            .await?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.repo.ping().await
    }

    fn backend(&self) -> &'static str {
        "postgres"
    }
}
