//! Lead entity model
//!
//! This module contains the SeaORM entity model for the leads table. A lead is a
//! prospect owned by one user and tracked through the sales pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[schema(as = Lead)]
#[sea_orm(table_name = "leads")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning user; every query is scoped by it
    #[sea_orm(indexed)]
    pub user_id: Uuid,

    pub business_name: String,
    pub owner_name: Option<String>,
    pub business_phone: Option<String>,
    pub owner_phone: Option<String>,
    pub email: Option<String>,
    pub instagram: Option<String>,
    pub website: Option<String>,

    /// Industry / category, free text
    pub rubro: Option<String>,
    pub ciudad: Option<String>,
    pub tipo_cliente: TipoCliente,
    pub fuente: Fuente,
    pub tipo_negocio: Option<String>,

    /// Stage id from the stage catalog
    pub estado_actual: String,
    pub nivel_interes: NivelInteres,
    pub potencial_venta: PotencialVenta,
    pub valor_estimado_usd: f64,
    pub monto_propuesta: f64,

    #[schema(value_type = Option<String>, format = DateTime)]
    pub fecha_ultima_interaccion: Option<DateTimeWithTimeZone>,
    #[schema(value_type = Option<String>, format = Date)]
    pub fecha_proximo_followup: Option<Date>,
    pub contador_seguimientos: i32,
    pub follow_up_interval_days: i32,
    pub seguido_hoy: bool,
    /// Local date on which `seguido_hoy` was last set
    #[schema(value_type = Option<String>, format = Date)]
    pub seguido_hoy_fecha: Option<Date>,
    pub seguimiento_activo: bool,

    pub micro_discovery_completado: bool,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub fecha_discovery: Option<DateTimeWithTimeZone>,
    #[schema(value_type = Option<String>, format = DateTime)]
    pub fecha_venta: Option<DateTimeWithTimeZone>,

    pub loom_url: Option<String>,
    pub propuesta_url: Option<String>,
    pub propuesta_pdf_url: Option<String>,
    pub notas_negocio_url: Option<String>,
    pub notas: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    #[schema(value_type = Option<Object>)]
    pub sop_links: Option<Json>,

    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::lead_stage_history::Entity")]
    StageHistory,
    #[sea_orm(has_many = "super::lead_interaction::Entity")]
    Interactions,
}

impl Related<super::lead_stage_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StageHistory.def()
    }
}

impl Related<super::lead_interaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Interactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// First non-blank phone number, preferring the owner's personal line.
    pub fn contact_phone(&self) -> Option<&str> {
        [self.owner_phone.as_deref(), self.business_phone.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|phone| !phone.is_empty())
    }

    /// Name used when addressing the lead in messages.
    pub fn display_contact_name(&self) -> &str {
        self.owner_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(self.business_name.as_str())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum NivelInteres {
    #[sea_orm(string_value = "frio")]
    #[default]
    Frio,
    #[sea_orm(string_value = "tibio")]
    Tibio,
    #[sea_orm(string_value = "caliente")]
    Caliente,
}

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
pub enum PotencialVenta {
    #[sea_orm(string_value = "bajo")]
    Bajo,
    #[sea_orm(string_value = "medio")]
    #[default]
    Medio,
    #[sea_orm(string_value = "alto")]
    Alto,
}

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
pub enum TipoCliente {
    #[sea_orm(string_value = "mayorista")]
    Mayorista,
    #[sea_orm(string_value = "minorista")]
    Minorista,
    #[sea_orm(string_value = "local_servicio")]
    LocalServicio,
    #[sea_orm(string_value = "industrial")]
    #[default]
    Industrial,
    #[sea_orm(string_value = "saas")]
    Saas,
    #[sea_orm(string_value = "ecommerce")]
    Ecommerce,
}

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
pub enum Fuente {
    #[sea_orm(string_value = "instagram")]
    Instagram,
    #[sea_orm(string_value = "ads")]
    Ads,
    #[sea_orm(string_value = "referido")]
    Referido,
    #[sea_orm(string_value = "manual")]
    Manual,
    #[sea_orm(string_value = "google")]
    Google,
    #[sea_orm(string_value = "whois")]
    Whois,
    #[sea_orm(string_value = "whatsapp")]
    #[default]
    Whatsapp,
    #[sea_orm(string_value = "linkedin")]
    Linkedin,
}
