//! Graph store contract
//!
//! The expansion engine only ever creates, looks up and upgrades nodes and
//! appends edges. Both implementations make `create_or_get` and `add_edge`
//! atomic so concurrent workers never produce two nodes for one signature or
//! two edges for one `(source, raw_text)` pair.

mod export;
mod memory;
mod postgres;

pub use export::{reference_graph, GraphNode, GraphStatistics, ReferenceGraph};
pub use memory::InMemoryGraphStore;
pub use postgres::PgGraphStore;

use crate::errors::Result;
use crate::models::{
    CitationEdge, ContentUpgrade, DocumentDraft, DocumentId, DocumentNode, EdgeDraft, Signature,
};
use async_trait::async_trait;

/// Result of an atomic create-or-get
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(DocumentNode),
    Existing(DocumentNode),
}

impl CreateOutcome {
    pub fn node(&self) -> &DocumentNode {
        match self {
            CreateOutcome::Created(node) | CreateOutcome::Existing(node) => node,
        }
    }

    pub fn into_node(self) -> DocumentNode {
        match self {
            CreateOutcome::Created(node) | CreateOutcome::Existing(node) => node,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

/// Durable holder of document nodes and citation edges
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Look up a node by its signature
    async fn find(&self, signature: &Signature) -> Result<Option<DocumentNode>>;

    /// Look up a node by id
    async fn get(&self, id: DocumentId) -> Result<Option<DocumentNode>>;

    /// All nodes whose first-author surname equals `surname` (lower-cased)
    async fn find_by_surname(&self, surname: &str) -> Result<Vec<DocumentNode>>;

    /// Insert a node for `signature` unless one exists already
    async fn create_or_get(&self, signature: Signature, draft: DocumentDraft)
        -> Result<CreateOutcome>;

    /// Attach content to a stub. Nodes that already have content are returned unchanged.
    async fn attach_content(&self, id: DocumentId, upgrade: ContentUpgrade)
        -> Result<DocumentNode>;

    /// Append an edge; `None` when the same `(source, raw_text)` edge exists
    async fn add_edge(&self, edge: EdgeDraft) -> Result<Option<CitationEdge>>;

    /// Outgoing edges of a node in insertion order
    async fn edges_from(&self, id: DocumentId) -> Result<Vec<CitationEdge>>;

    /// Incoming edges of a node (who cites it), oldest first
    async fn edges_to(&self, id: DocumentId) -> Result<Vec<CitationEdge>>;

    /// Connectivity check for readiness
    async fn ping(&self) -> Result<()>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Build the store selected by `store.backend`
pub async fn connect_store(config: &crate::AppConfig) -> Result<std::sync::Arc<dyn GraphStore>> {
    use crate::config::StoreBackend;
    use crate::db::{DbPool, Repository};

    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory graph store");
            Ok(std::sync::Arc::new(InMemoryGraphStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = DbPool::new(&config.database).await?;
            Ok(std::sync::Arc::new(PgGraphStore::new(Repository::new(pool))))
        }
    }
}
