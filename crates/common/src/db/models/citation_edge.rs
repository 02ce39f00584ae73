//! Citation edge entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citation_edges")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Document whose text contains the citation
    pub source_id: Uuid,

    /// Document being cited
    pub target_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub raw_text: String,

    /// SHA-256 of raw_text; unique together with source_id
    #[sea_orm(column_type = "Text")]
    pub raw_text_hash: String,

    #[sea_orm(column_type = "Text")]
    pub context: String,

    pub depth: i32,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::SourceId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Source,

    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::TargetId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Target,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Source.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
