//! Document entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub signature: String,

    /// SHA-256 of the signature, unique
    #[sea_orm(column_type = "Text", unique)]
    pub signature_hash: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub authors: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub surname: Option<String>,

    pub year: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub abstract_text: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub content: Option<String>,

    /// "stub" | "has_content"
    #[sea_orm(column_type = "Text")]
    pub content_state: String,

    /// "uploaded" | "acquired" | "stub"
    #[sea_orm(column_type = "Text")]
    pub origin: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub acquisition_source: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub doi: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub journal: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::citation_edge::Entity", on_delete = "Cascade")]
    CitationsFrom,
}

impl ActiveModelBehavior for ActiveModel {}
