//! RefGraph Common Library
//!
//! Shared code for the RefGraph crates including:
//! - Document graph model (nodes, citation edges, signatures)
//! - Graph store contract with in-memory and PostgreSQL implementations
//! - Database models and repository patterns
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod errors;
pub mod graph;
pub mod metrics;
pub mod models;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use graph::{
    connect_store, reference_graph, CreateOutcome, GraphNode, GraphStatistics, GraphStore,
    InMemoryGraphStore, PgGraphStore, ReferenceGraph,
};
pub use models::{
    CitationEdge, ContentState, ContentUpgrade, DocumentDraft, DocumentId, DocumentNode,
    EdgeDraft, Origin, ProviderKind, Signature,
};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
