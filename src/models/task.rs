//! Task entity model
//!
//! Independent to-do items, optionally linked to a lead.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Task)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(indexed)]
    pub user_id: Uuid,
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[schema(value_type = Option<String>, format = Date)]
    pub due_date: Option<Date>,
    pub completed: bool,
    /// Set exactly when `completed` is true
    #[schema(value_type = Option<String>, format = DateTime)]
    pub completed_at: Option<DateTimeWithTimeZone>,
    pub priority: TaskPriority,
    /// Grouping tag; not validated against the stage catalog
    pub stage_related: Option<String>,
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
pub enum TaskPriority {
    #[sea_orm(string_value = "baja")]
    Baja,
    #[sea_orm(string_value = "media")]
    #[default]
    Media,
    #[sea_orm(string_value = "alta")]
    Alta,
    #[sea_orm(string_value = "urgente")]
    Urgente,
}
