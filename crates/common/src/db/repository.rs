//! Repository pattern for database operations
//!
//! Inserts go through raw `ON CONFLICT DO NOTHING` statements so concurrent
//! writers racing on the same signature or edge key never error out; the
//! loser simply observes zero affected rows.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::Result;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, QueryFilter,
    QueryOrder, Statement,
};
use uuid::Uuid;

/// Fields written when a stub receives content
#[derive(Debug, Clone)]
pub struct StubUpgradeRow {
    pub content: String,
    pub origin: String,
    pub acquisition_source: Option<String>,
    pub title: Option<String>,
    pub authors: Option<String>,
    pub year: Option<i32>,
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    pub journal: Option<String>,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Find document by ID
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Find document by signature hash. `primary` bypasses the replica to read our own writes.
    pub async fn find_document_by_signature_hash(
        &self,
        hash: &str,
        primary: bool,
    ) -> Result<Option<Document>> {
        let conn = if primary { self.write_conn() } else { self.read_conn() };
        DocumentEntity::find()
            .filter(DocumentColumn::SignatureHash.eq(hash))
            .one(conn)
            .await
            .map_err(Into::into)
    }

    /// Documents by first-author surname, oldest first
    pub async fn find_documents_by_surname(&self, surname: &str) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::Surname.eq(surname))
            .order_by_asc(DocumentColumn::CreatedAt)
            .order_by_asc(DocumentColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Insert a document unless its signature hash exists. Returns true when inserted.
    pub async fn insert_document_if_absent(&self, doc: &Document) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO documents (
                id, signature, signature_hash, title, authors, surname, year,
                abstract_text, content, content_state, origin, acquisition_source,
                doi, journal, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (signature_hash) DO NOTHING
            "#,
            vec![
                doc.id.into(),
                doc.signature.clone().into(),
                doc.signature_hash.clone().into(),
                doc.title.clone().into(),
                doc.authors.clone().into(),
                doc.surname.clone().into(),
                doc.year.into(),
                doc.abstract_text.clone().into(),
                doc.content.clone().into(),
                doc.content_state.clone().into(),
                doc.origin.clone().into(),
                doc.acquisition_source.clone().into(),
                doc.doi.clone().into(),
                doc.journal.clone().into(),
                doc.created_at.into(),
                doc.updated_at.into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Attach content to a stub. Returns true when a stub row was upgraded.
    pub async fn upgrade_stub(&self, id: Uuid, row: StubUpgradeRow) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            UPDATE documents SET
                content = $2,
                content_state = 'has_content',
                origin = $3,
                acquisition_source = $4,
                title = COALESCE(NULLIF($5, ''), title),
                authors = COALESCE(NULLIF($6, ''), authors),
                year = COALESCE($7, year),
                abstract_text = COALESCE($8, abstract_text),
                doi = COALESCE($9, doi),
                journal = COALESCE($10, journal),
                updated_at = NOW()
            WHERE id = $1 AND content_state = 'stub'
            "#,
            vec![
                id.into(),
                row.content.into(),
                row.origin.into(),
                row.acquisition_source.into(),
                row.title.into(),
                row.authors.into(),
                row.year.into(),
                row.abstract_text.into(),
                row.doi.into(),
                row.journal.into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find document by ID on the primary
    pub async fn find_document_by_id_primary(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.write_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Citation Edge Operations
    // ========================================================================

    /// Insert an edge unless `(source_id, raw_text_hash)` exists. Returns true when inserted.
    pub async fn insert_edge_if_absent(&self, edge: &CitationEdge) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            r#"
            INSERT INTO citation_edges (
                id, source_id, target_id, raw_text, raw_text_hash, context, depth, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (source_id, raw_text_hash) DO NOTHING
            "#,
            vec![
                edge.id.into(),
                edge.source_id.into(),
                edge.target_id.into(),
                edge.raw_text.clone().into(),
                edge.raw_text_hash.clone().into(),
                edge.context.clone().into(),
                edge.depth.into(),
                edge.created_at.into(),
            ],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Outgoing edges of a document in insertion order
    pub async fn edges_from(&self, source_id: Uuid) -> Result<Vec<CitationEdge>> {
        CitationEdgeEntity::find()
            .filter(CitationEdgeColumn::SourceId.eq(source_id))
            .order_by_asc(CitationEdgeColumn::CreatedAt)
            .order_by_asc(CitationEdgeColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Incoming edges of a document, oldest first
    pub async fn edges_to(&self, target_id: Uuid) -> Result<Vec<CitationEdge>> {
        CitationEdgeEntity::find()
            .filter(CitationEdgeColumn::TargetId.eq(target_id))
            .order_by_asc(CitationEdgeColumn::CreatedAt)
            .order_by_asc(CitationEdgeColumn::Id)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
