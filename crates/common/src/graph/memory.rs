//! In-process graph store backed by DashMap

use super::{CreateOutcome, GraphStore};
use crate::errors::{AppError, Result};
use crate::models::{
    CitationEdge, ContentUpgrade, DocumentDraft, DocumentId, DocumentNode, EdgeDraft, Signature,
};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Graph store that lives as long as the process
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    nodes: DashMap<DocumentId, DocumentNode>,
    by_signature: DashMap<Signature, DocumentId>,
    edges: DashMap<DocumentId, Vec<CitationEdge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.iter().map(|entry| entry.value().len()).sum()
    }

    /// Snapshot of every node, oldest first
    pub fn nodes(&self) -> Vec<DocumentNode> {
        let mut nodes: Vec<DocumentNode> =
            self.nodes.iter().map(|entry| entry.value().clone()).collect();
        nodes.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        nodes
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn find(&self, signature: &Signature) -> Result<Option<DocumentNode>> {
        let Some(id) = self.by_signature.get(signature).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        Ok(self.nodes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn get(&self, id: DocumentId) -> Result<Option<DocumentNode>> {
        Ok(self.nodes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_surname(&self, surname: &str) -> Result<Vec<DocumentNode>> {
        let mut matches: Vec<DocumentNode> = self
            .nodes
            .iter()
            .filter(|entry| entry.value().surname.as_deref() == Some(surname))
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(matches)
    }

    async fn create_or_get(
        &self,
        signature: Signature,
        draft: DocumentDraft,
    ) -> Result<CreateOutcome> {
        match self.by_signature.entry(signature.clone()) {
            Entry::Occupied(entry) => {
                let id = *entry.get();
                let node = self.nodes.get(&id).map(|n| n.value().clone()).ok_or_else(|| {
                    AppError::Internal {
                        message: format!("signature {} points at missing node {}", signature, id),
                    }
                })?;
                Ok(CreateOutcome::Existing(node))
            }
            Entry::Vacant(entry) => {
                let node = DocumentNode::from_draft(signature, draft);
                self.nodes.insert(node.id, node.clone());
                entry.insert(node.id);
                Ok(CreateOutcome::Created(node))
            }
        }
    }

    async fn attach_content(
        &self,
        id: DocumentId,
        upgrade: ContentUpgrade,
    ) -> Result<DocumentNode> {
        let mut node = self
            .nodes
            .get_mut(&id)
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;
        node.apply_upgrade(upgrade);
        Ok(node.clone())
    }

    async fn add_edge(&self, edge: EdgeDraft) -> Result<Option<CitationEdge>> {
        let mut edges = self.edges.entry(edge.source_id).or_default();
        if edges.iter().any(|existing| existing.raw_text == edge.raw_text) {
            return Ok(None);
        }
        let edge = edge.into_edge();
        edges.push(edge.clone());
        Ok(Some(edge))
    }

    async fn edges_from(&self, id: DocumentId) -> Result<Vec<CitationEdge>> {
        Ok(self
            .edges
            .get(&id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn edges_to(&self, id: DocumentId) -> Result<Vec<CitationEdge>> {
        let mut incoming: Vec<CitationEdge> = self
            .edges
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|edge| edge.target_id == id)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        incoming.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(incoming)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
