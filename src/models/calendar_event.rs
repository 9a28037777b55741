//! Local calendar event entity model

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = CalendarEvent)]
#[sea_orm(table_name = "calendar_events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub start_time: DateTimeWithTimeZone,
    #[schema(value_type = String, format = DateTime)]
    pub end_time: DateTimeWithTimeZone,
    pub event_type: EventType,
    /// Denormalized lead business name for display
    pub lead_name: Option<String>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    #[sea_orm(string_value = "discovery")]
    Discovery,
    #[sea_orm(string_value = "venta")]
    Venta,
    #[sea_orm(string_value = "followup")]
    Followup,
    #[sea_orm(string_value = "loom")]
    Loom,
    #[sea_orm(string_value = "otro")]
    #[default]
    Otro,
}
