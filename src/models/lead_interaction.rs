//! Lead interaction entity model
//!
//! Activity log for a lead: stage changes, follow-ups and other touch points.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Interaction kind recorded when a lead changes stage.
pub const KIND_STAGE_CHANGE: &str = "cambio_etapa";
/// Interaction kind recorded when a follow-up is logged.
pub const KIND_FOLLOW_UP: &str = "follow_up";

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = LeadInteraction)]
#[sea_orm(table_name = "lead_interactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub lead_id: Uuid,
    pub user_id: Uuid,
    pub tipo_interaccion: String,
    pub descripcion: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Json>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::lead::Entity",
        from = "Column::LeadId",
        to = "super::lead::Column::Id",
        on_delete = "Cascade"
    )]
    Lead,
}

impl Related<super::lead::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lead.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
