//! Document upload and graph read handlers

use super::validate;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use refgraph_common::{
    errors::{AppError, Result},
    reference_graph, ContentState, DocumentId, DocumentNode, GraphStatistics, Origin,
    ProviderKind,
};
use refgraph_expansion::{register_seed, SeedDocument};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Upload a seed document as JSON
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    /// Defaults to the first non-empty line of `content`
    #[validate(length(min = 1, max = 1000))]
    pub title: Option<String>,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub authors: String,

    #[validate(range(min = 1000, max = 2100))]
    pub year: Option<i32>,

    pub abstract_text: Option<String>,

    #[validate(length(min = 7, max = 255))]
    pub doi: Option<String>,

    #[validate(length(max = 500))]
    pub journal: Option<String>,

    #[validate(length(min = 1))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GetDocumentParams {
    #[serde(default)]
    pub include_content: bool,
}

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    pub id: DocumentId,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub journal: Option<String>,
    pub abstract_text: Option<String>,
    pub content_state: ContentState,
    pub origin: Origin,
    pub acquisition_source: Option<ProviderKind>,
    pub content_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentResponse {
    fn from_node(node: DocumentNode, include_content: bool) -> Self {
        let content_chars = node.content.as_deref().map_or(0, |c| c.chars().count());
        Self {
            id: node.id,
            title: node.title,
            authors: node.authors,
            year: node.year,
            doi: node.doi,
            journal: node.journal,
            abstract_text: node.abstract_text,
            content_state: node.content_state,
            origin: node.origin,
            acquisition_source: node.acquisition_source,
            content_chars,
            content: if include_content { node.content } else { None },
            created_at: node.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreateDocumentResponse {
    pub document: DocumentResponse,
    pub created: bool,
    /// An existing stub received the uploaded content
    pub upgraded: bool,
}

#[derive(Debug, Serialize)]
pub struct CitationResponse {
    pub edge_id: Uuid,
    pub target_id: DocumentId,
    pub target_title: Option<String>,
    pub target_content_state: Option<ContentState>,
    pub raw_text: String,
    pub context: String,
    pub depth: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CitationsResponse {
    pub document_id: DocumentId,
    pub citations: Vec<CitationResponse>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct CitingDocumentResponse {
    pub edge_id: Uuid,
    pub source_id: DocumentId,
    pub source_title: Option<String>,
    pub raw_text: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CitedByResponse {
    pub document_id: DocumentId,
    pub cited_by: Vec<CitingDocumentResponse>,
    pub total: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphParams {
    /// Defaults to `expansion.default_max_depth`
    pub max_depth: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct GraphNodeResponse {
    pub id: DocumentId,
    pub title: String,
    pub authors: String,
    pub year: Option<i32>,
    pub content_state: ContentState,
    pub origin: Origin,
    /// Hops from the root document
    pub depth: u32,
}

#[derive(Debug, Serialize)]
pub struct GraphEdgeResponse {
    pub id: Uuid,
    pub source_id: DocumentId,
    pub target_id: DocumentId,
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub root_id: DocumentId,
    pub max_depth: u32,
    pub nodes: Vec<GraphNodeResponse>,
    pub edges: Vec<GraphEdgeResponse>,
    pub statistics: GraphStatistics,
}

/// Register a seed document (or upgrade the stub it matches)
pub async fn create_document(
    State(state): State<AppState>,
    Json(request): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<CreateDocumentResponse>)> {
    validate(&request)?;

    let limit = state.config.server.max_upload_bytes;
    if request.content.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: request.content.len(),
            limit,
        });
    }

    let mut seed = SeedDocument::from_text(&request.content);
    if let Some(title) = request.title.filter(|t| !t.trim().is_empty()) {
        seed.title = title;
    }
    seed.authors = request.authors;
    seed.year = request.year;
    seed.abstract_text = request.abstract_text;
    seed.doi = request.doi;
    seed.journal = request.journal;

    let registration = register_seed(state.store.as_ref(), seed, &state.config.resolver).await?;

    tracing::info!(
        document_id = %registration.node.id,
        created = registration.created,
        upgraded = registration.upgraded,
        "Document uploaded"
    );

    let status = if registration.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(CreateDocumentResponse {
            document: DocumentResponse::from_node(registration.node, false),
            created: registration.created,
            upgraded: registration.upgraded,
        }),
    ))
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GetDocumentParams>,
) -> Result<Json<DocumentResponse>> {
    let node = load_node(&state, &id).await?;
    Ok(Json(DocumentResponse::from_node(node, params.include_content)))
}

/// Outgoing citation edges of a document with their targets
pub async fn get_citations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CitationsResponse>> {
    let node = load_node(&state, &id).await?;
    let edges = state.store.edges_from(node.id).await?;

    let mut citations = Vec::with_capacity(edges.len());
    for edge in edges {
        let target = state.store.get(edge.target_id).await?;
        citations.push(CitationResponse {
            edge_id: edge.id,
            target_id: edge.target_id,
            target_title: target.as_ref().map(|t| t.title.clone()),
            target_content_state: target.map(|t| t.content_state),
            raw_text: edge.raw_text,
            context: edge.context,
            depth: edge.depth,
            created_at: edge.created_at,
        });
    }

    Ok(Json(CitationsResponse {
        document_id: node.id,
        total: citations.len(),
        citations,
    }))
}

/// Documents whose references point at this one
pub async fn get_cited_by(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CitedByResponse>> {
    let node = load_node(&state, &id).await?;
    let edges = state.store.edges_to(node.id).await?;

    let mut cited_by = Vec::with_capacity(edges.len());
    for edge in edges {
        let source = state.store.get(edge.source_id).await?;
        cited_by.push(CitingDocumentResponse {
            edge_id: edge.id,
            source_id: edge.source_id,
            source_title: source.map(|s| s.title),
            raw_text: edge.raw_text,
            context: edge.context,
            created_at: edge.created_at,
        });
    }

    Ok(Json(CitedByResponse {
        document_id: node.id,
        total: cited_by.len(),
        cited_by,
    }))
}

/// Reference graph reachable from a document within `max_depth` hops
pub async fn get_graph(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<GraphParams>,
) -> Result<Json<GraphResponse>> {
    let limits = &state.config.expansion;
    let max_depth = params.max_depth.unwrap_or(limits.default_max_depth);
    if max_depth > limits.max_depth_limit {
        return Err(AppError::Validation {
            message: format!("max_depth must be at most {}", limits.max_depth_limit),
            field: Some("max_depth".to_string()),
        });
    }

    let node = load_node(&state, &id).await?;
    let graph = reference_graph(state.store.as_ref(), node.id, max_depth)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound { id: id.clone() })?;

    Ok(Json(GraphResponse {
        root_id: graph.root,
        max_depth: graph.max_depth,
        nodes: graph
            .nodes
            .into_iter()
            .map(|n| GraphNodeResponse {
                id: n.node.id,
                title: n.node.title,
                authors: n.node.authors,
                year: n.node.year,
                content_state: n.node.content_state,
                origin: n.node.origin,
                depth: n.depth,
            })
            .collect(),
        edges: graph
            .edges
            .into_iter()
            .map(|e| GraphEdgeResponse {
                id: e.id,
                source_id: e.source_id,
                target_id: e.target_id,
                raw_text: e.raw_text,
            })
            .collect(),
        statistics: graph.statistics,
    }))
}

async fn load_node(state: &AppState, id: &str) -> Result<DocumentNode> {
    let document_id: DocumentId = id.parse().map_err(|_| AppError::InvalidFormat {
        message: format!("Invalid document ID: {}", id),
    })?;
    state
        .store
        .get(document_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })
}
