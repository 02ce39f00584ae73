//! SeaORM entity models

mod citation_edge;
mod document;

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, Entity as DocumentEntity,
    Model as Document,
};

pub use citation_edge::{
    ActiveModel as CitationEdgeActiveModel, Column as CitationEdgeColumn,
    Entity as CitationEdgeEntity, Model as CitationEdge,
};
