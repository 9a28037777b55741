//! # Lead Record Store
//!
//! The only writer of lead state. Validates input, applies the pipeline rules
//! (default stage, follow-up scheduling, stage history) and, after each
//! committed write, publishes a realtime change event and schedules a webhook
//! fan-out. Callers never wait on delivery.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use sea_orm::{IntoActiveModel, Set};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tokio_util::task::TaskTracker;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::lead::{self, Fuente, NivelInteres, PotencialVenta, TipoCliente};
use crate::models::{lead_interaction, lead_stage_history};
use crate::pipeline::derived::{self, LeadView};
use crate::pipeline::stages::{self, WON};
use crate::realtime::{ChangeEvent, ChangeFeed};
use crate::repositories::LeadRepository;
use crate::webhook_dispatch::{WebhookDispatcher, WebhookEvent};

pub const DEFAULT_FOLLOW_UP_INTERVAL_DAYS: i32 = 3;
/// Next follow-up after a stage move, independent of the lead's own interval.
pub const MOVE_FOLLOW_UP_DAYS: i64 = 3;

/// Fields accepted when creating a lead. Unset fields take pipeline defaults.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewLead {
    pub business_name: String,
    pub owner_name: Option<String>,
    pub business_phone: Option<String>,
    pub owner_phone: Option<String>,
    pub email: Option<String>,
    pub instagram: Option<String>,
    pub website: Option<String>,
    pub rubro: Option<String>,
    pub ciudad: Option<String>,
    pub tipo_cliente: Option<TipoCliente>,
    pub fuente: Option<Fuente>,
    pub tipo_negocio: Option<String>,
    pub estado_actual: Option<String>,
    pub nivel_interes: Option<NivelInteres>,
    pub potencial_venta: Option<PotencialVenta>,
    pub valor_estimado_usd: Option<f64>,
    pub monto_propuesta: Option<f64>,
    pub follow_up_interval_days: Option<i32>,
    pub seguimiento_activo: Option<bool>,
    pub micro_discovery_completado: Option<bool>,
    pub fecha_discovery: Option<DateTime<FixedOffset>>,
    pub fecha_venta: Option<DateTime<FixedOffset>>,
    pub loom_url: Option<String>,
    pub propuesta_url: Option<String>,
    pub propuesta_pdf_url: Option<String>,
    pub notas_negocio_url: Option<String>,
    pub notas: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub sop_links: Option<Value>,
}

/// Partial update. Absent fields are left unchanged; an explicit `null`
/// clears a nullable field.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct LeadPatch {
    pub business_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub owner_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub business_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub owner_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub instagram: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub website: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub rubro: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub ciudad: Option<Option<String>>,
    pub tipo_cliente: Option<TipoCliente>,
    pub fuente: Option<Fuente>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub tipo_negocio: Option<Option<String>>,
    /// Only accepted when equal to the current stage; use a move to change it
    pub estado_actual: Option<String>,
    pub nivel_interes: Option<NivelInteres>,
    pub potencial_venta: Option<PotencialVenta>,
    pub valor_estimado_usd: Option<f64>,
    pub monto_propuesta: Option<f64>,
    pub follow_up_interval_days: Option<i32>,
    pub seguimiento_activo: Option<bool>,
    pub micro_discovery_completado: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub fecha_discovery: Option<Option<DateTime<FixedOffset>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub fecha_venta: Option<Option<DateTime<FixedOffset>>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>, format = Date)]
    pub fecha_proximo_followup: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub loom_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub propuesta_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub propuesta_pdf_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub notas_negocio_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<String>)]
    pub notas: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    #[schema(value_type = Option<Object>)]
    pub sop_links: Option<Option<Value>>,
}

/// Present fields deserialize to `Some`, so `null` becomes `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FollowUpOutcome {
    pub next_followup: NaiveDate,
    pub follow_up_count: i32,
    #[serde(skip)]
    pub lead: lead::Model,
}

fn validate_business_name(name: &str) -> Result<(), CrmError> {
    if name.trim().is_empty() {
        return Err(CrmError::validation("business_name", "business_name is required"));
    }
    Ok(())
}

fn validate_stage(stage: &str) -> Result<(), CrmError> {
    if !stages::is_known(stage) {
        return Err(CrmError::validation(
            "estado_actual",
            format!("unknown stage '{}'", stage),
        ));
    }
    Ok(())
}

fn validate_amount(field: &'static str, amount: Option<f64>) -> Result<(), CrmError> {
    match amount {
        Some(value) if !value.is_finite() || value < 0.0 => Err(CrmError::validation(
            field,
            format!("{} must be a non-negative number", field),
        )),
        _ => Ok(()),
    }
}

fn validate_interval(days: Option<i32>) -> Result<(), CrmError> {
    match days {
        Some(days) if days < 1 => Err(CrmError::validation(
            "follow_up_interval_days",
            "follow_up_interval_days must be at least 1",
        )),
        _ => Ok(()),
    }
}

impl NewLead {
    pub fn validate(&self) -> Result<(), CrmError> {
        validate_business_name(&self.business_name)?;
        if let Some(stage) = &self.estado_actual {
            validate_stage(stage)?;
        }
        validate_amount("valor_estimado_usd", self.valor_estimado_usd)?;
        validate_amount("monto_propuesta", self.monto_propuesta)?;
        validate_interval(self.follow_up_interval_days)
    }
}

impl LeadPatch {
    pub fn validate(&self, current: &lead::Model) -> Result<(), CrmError> {
        if let Some(name) = &self.business_name {
            validate_business_name(name)?;
        }
        if let Some(stage) = &self.estado_actual {
            validate_stage(stage)?;
            if *stage != current.estado_actual {
                return Err(CrmError::validation(
                    "estado_actual",
                    "stage changes must go through a move",
                ));
            }
        }
        validate_amount("valor_estimado_usd", self.valor_estimado_usd)?;
        validate_amount("monto_propuesta", self.monto_propuesta)?;
        validate_interval(self.follow_up_interval_days)
    }
}

/// Applies the present fields of a patch to an active model.
macro_rules! apply_patch {
    ($active:ident, $patch:ident, [$($field:ident),* $(,)?]) => {
        $(if let Some(value) = $patch.$field {
            $active.$field = Set(value);
        })*
    };
}

#[derive(Debug, Clone)]
pub struct LeadStore {
    repo: LeadRepository,
    feed: ChangeFeed,
    dispatcher: WebhookDispatcher,
    tracker: TaskTracker,
    offset: FixedOffset,
}

impl LeadStore {
    pub fn new(
        repo: LeadRepository,
        feed: ChangeFeed,
        dispatcher: WebhookDispatcher,
        tracker: TaskTracker,
        offset: FixedOffset,
    ) -> Self {
        Self {
            repo,
            feed,
            dispatcher,
            tracker,
            offset,
        }
    }

    pub fn feed(&self) -> &ChangeFeed {
        &self.feed
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        derived::local_today(now, self.offset)
    }

    pub fn view(&self, lead: &lead::Model) -> LeadView {
        derived::derive(lead, Utc::now(), self.offset)
    }

    fn notify(&self, user_id: Uuid, event: WebhookEvent, payload: Value) {
        self.dispatcher
            .dispatch_in_background(&self.tracker, user_id, event, payload);
    }

    fn lead_payload(lead: &lead::Model) -> Value {
        serde_json::to_value(lead).unwrap_or_else(|_| json!({ "id": lead.id }))
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<lead::Model, CrmError> {
        self.repo.get(user_id, id).await
    }

    pub async fn list(&self, user_id: Uuid) -> Result<Vec<lead::Model>, CrmError> {
        self.repo.list(user_id).await
    }

    pub async fn list_views(&self, user_id: Uuid) -> Result<Vec<LeadView>, CrmError> {
        let leads = self.repo.list(user_id).await?;
        Ok(derived::derive_all(leads, Utc::now(), self.offset))
    }

    pub async fn create(&self, user_id: Uuid, new: NewLead) -> Result<lead::Model, CrmError> {
        new.validate()?;
        let now = Utc::now();
        let today = self.today(now);

        let active = lead::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            business_name: Set(new.business_name.trim().to_string()),
            owner_name: Set(new.owner_name),
            business_phone: Set(new.business_phone),
            owner_phone: Set(new.owner_phone),
            email: Set(new.email),
            instagram: Set(new.instagram),
            website: Set(new.website),
            rubro: Set(new.rubro),
            ciudad: Set(new.ciudad),
            tipo_cliente: Set(new.tipo_cliente.unwrap_or_default()),
            fuente: Set(new.fuente.unwrap_or_default()),
            tipo_negocio: Set(new.tipo_negocio),
            estado_actual: Set(new
                .estado_actual
                .unwrap_or_else(|| stages::first_stage().id.to_string())),
            nivel_interes: Set(new.nivel_interes.unwrap_or_default()),
            potencial_venta: Set(new.potencial_venta.unwrap_or_default()),
            valor_estimado_usd: Set(new.valor_estimado_usd.unwrap_or(0.0)),
            monto_propuesta: Set(new.monto_propuesta.unwrap_or(0.0)),
            fecha_ultima_interaccion: Set(None),
            fecha_proximo_followup: Set(Some(today + Duration::days(MOVE_FOLLOW_UP_DAYS))),
            contador_seguimientos: Set(0),
            follow_up_interval_days: Set(new
                .follow_up_interval_days
                .unwrap_or(DEFAULT_FOLLOW_UP_INTERVAL_DAYS)),
            seguido_hoy: Set(false),
            seguido_hoy_fecha: Set(None),
            seguimiento_activo: Set(new.seguimiento_activo.unwrap_or(true)),
            micro_discovery_completado: Set(new.micro_discovery_completado.unwrap_or(false)),
            fecha_discovery: Set(new.fecha_discovery),
            fecha_venta: Set(new.fecha_venta),
            loom_url: Set(new.loom_url),
            propuesta_url: Set(new.propuesta_url),
            propuesta_pdf_url: Set(new.propuesta_pdf_url),
            notas_negocio_url: Set(new.notas_negocio_url),
            notas: Set(new.notas),
            sop_links: Set(new.sop_links),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let lead = self.repo.insert(active).await?;
        info!(lead_id = %lead.id, user_id = %user_id, stage = %lead.estado_actual, "Lead created");

        self.feed.publish(ChangeEvent::Insert(lead.clone()));
        self.notify(user_id, WebhookEvent::LeadCreated, Self::lead_payload(&lead));
        Ok(lead)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: LeadPatch,
    ) -> Result<lead::Model, CrmError> {
        let current = self.repo.get(user_id, id).await?;
        patch.validate(&current)?;

        let mut active = current.into_active_model();
        if let Some(name) = patch.business_name {
            active.business_name = Set(name.trim().to_string());
        }
        apply_patch!(active, patch, [
            owner_name, business_phone, owner_phone, email, instagram, website,
            rubro, ciudad, tipo_negocio, fecha_discovery, fecha_venta,
            fecha_proximo_followup, loom_url, propuesta_url, propuesta_pdf_url,
            notas_negocio_url, notas, sop_links, tipo_cliente, fuente, nivel_interes,
            potencial_venta, valor_estimado_usd, monto_propuesta, follow_up_interval_days,
            seguimiento_activo, micro_discovery_completado,
        ]);
        active.updated_at = Set(Utc::now().into());

        let lead = self.repo.update(active).await?;
        info!(lead_id = %lead.id, user_id = %user_id, "Lead updated");

        self.feed.publish(ChangeEvent::Update(lead.clone()));
        self.notify(user_id, WebhookEvent::LeadUpdated, Self::lead_payload(&lead));
        Ok(lead)
    }

    /// Moves a lead to `new_stage`, recording the transition.
    ///
    /// `previous_stage` is the stage the caller saw; the stored stage is used when absent.
    /// Moving to the current stage is accepted and still recorded.
    pub async fn move_stage(
        &self,
        user_id: Uuid,
        id: Uuid,
        new_stage: &str,
        previous_stage: Option<&str>,
        notes: Option<String>,
    ) -> Result<lead::Model, CrmError> {
        validate_stage(new_stage)?;
        let current = self.repo.get(user_id, id).await?;

        let previous = match previous_stage {
            Some(seen) if seen != current.estado_actual => {
                warn!(
                    lead_id = %id,
                    seen,
                    stored = %current.estado_actual,
                    "Move requested from a stale stage"
                );
                seen.to_string()
            }
            Some(seen) => seen.to_string(),
            None => current.estado_actual.clone(),
        };

        let now = Utc::now();
        let today = self.today(now);
        let mut active = current.into_active_model();
        active.estado_actual = Set(new_stage.to_string());
        active.fecha_proximo_followup = Set(Some(today + Duration::days(MOVE_FOLLOW_UP_DAYS)));
        active.updated_at = Set(now.into());

        let history = lead_stage_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            lead_id: Set(id),
            user_id: Set(user_id),
            previous_stage: Set(Some(previous.clone())),
            new_stage: Set(new_stage.to_string()),
            notes: Set(notes),
            created_at: Set(now.into()),
        };
        let interaction = lead_interaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            lead_id: Set(id),
            user_id: Set(user_id),
            tipo_interaccion: Set(lead_interaction::KIND_STAGE_CHANGE.to_string()),
            descripcion: Set(Some(format!("{} → {}", previous, new_stage))),
            metadata: Set(Some(json!({ "from": previous, "to": new_stage }))),
            created_at: Set(now.into()),
        };

        let lead = self.repo.record_move(active, history, interaction).await?;
        info!(lead_id = %id, user_id = %user_id, from = %previous, to = %new_stage, "Lead moved");

        self.feed.publish(ChangeEvent::Update(lead.clone()));
        self.notify(
            user_id,
            WebhookEvent::LeadUpdated,
            json!({ "id": id, "newStage": new_stage, "previousStage": previous }),
        );
        if new_stage == WON {
            self.notify(user_id, WebhookEvent::LeadWon, Self::lead_payload(&lead));
        }
        Ok(lead)
    }

    /// Permanently deletes a lead with its history. No webhook is sent.
    pub async fn remove(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        self.repo.delete(user_id, id).await?;
        info!(lead_id = %id, user_id = %user_id, "Lead deleted");
        self.feed.publish(ChangeEvent::Delete { id, user_id });
        Ok(())
    }

    /// Records a contact made today.
    pub async fn mark_follow_up(&self, user_id: Uuid, id: Uuid) -> Result<FollowUpOutcome, CrmError> {
        let current = self.repo.get(user_id, id).await?;
        if current.contact_phone().is_none() {
            return Err(CrmError::Precondition(
                "lead has no phone number to contact".to_string(),
            ));
        }

        let now = Utc::now();
        let today = self.today(now);
        let count = current.contador_seguimientos + 1;
        let interval = current.follow_up_interval_days.max(1);
        let next_followup = today + Duration::days(i64::from(interval));

        let mut active = current.into_active_model();
        active.contador_seguimientos = Set(count);
        active.fecha_ultima_interaccion = Set(Some(now.into()));
        active.fecha_proximo_followup = Set(Some(next_followup));
        active.seguido_hoy = Set(true);
        active.seguido_hoy_fecha = Set(Some(today));
        active.updated_at = Set(now.into());

        let interaction = lead_interaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            lead_id: Set(id),
            user_id: Set(user_id),
            tipo_interaccion: Set(lead_interaction::KIND_FOLLOW_UP.to_string()),
            descripcion: Set(Some(format!("Seguimiento #{}", count))),
            metadata: Set(Some(json!({ "count": count, "next_followup": next_followup }))),
            created_at: Set(now.into()),
        };

        let lead = self.repo.record_follow_up(active, interaction).await?;
        info!(lead_id = %id, user_id = %user_id, count, %next_followup, "Follow-up recorded");

        self.feed.publish(ChangeEvent::Update(lead.clone()));
        self.notify(user_id, WebhookEvent::LeadUpdated, Self::lead_payload(&lead));
        Ok(FollowUpOutcome {
            next_followup,
            follow_up_count: count,
            lead,
        })
    }

    pub async fn history(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Vec<lead_stage_history::Model>, CrmError> {
        self.repo.get(user_id, id).await?;
        self.repo.stage_history(user_id, id).await
    }

    pub async fn interactions(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Vec<lead_interaction::Model>, CrmError> {
        self.repo.get(user_id, id).await?;
        self.repo.interactions(user_id, id).await
    }

}
