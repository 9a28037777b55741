//! Lead repository
//!
//! SeaORM access to `leads` and its append-only children
//! (`lead_stage_history`, `lead_interactions`). Every query is scoped by the
//! owning user. Multi-row writes run in a single transaction.

use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::lead::{self, Entity as Lead};
use crate::models::lead_interaction::{self, Entity as LeadInteraction};
use crate::models::lead_stage_history::{self, Entity as LeadStageHistory};

#[derive(Debug, Clone)]
pub struct LeadRepository {
    db: Arc<DatabaseConnection>,
}

impl LeadRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, user_id: Uuid, id: Uuid) -> Result<Option<lead::Model>, CrmError> {
        let lead = Lead::find_by_id(id)
            .filter(lead::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?;
        Ok(lead)
    }

    /// Like [`find_by_id`](Self::find_by_id) but unknown ids are an error.
    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<lead::Model, CrmError> {
        self.find_by_id(user_id, id)
            .await?
            .ok_or_else(|| CrmError::not_found("lead", id))
    }

    /// All leads of the user, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<lead::Model>, CrmError> {
        let leads = Lead::find()
            .filter(lead::Column::UserId.eq(user_id))
            .order_by_desc(lead::Column::CreatedAt)
            .order_by_asc(lead::Column::Id)
            .all(self.db.as_ref())
            .await?;
        Ok(leads)
    }

    pub async fn insert(&self, lead: lead::ActiveModel) -> Result<lead::Model, CrmError> {
        let model = lead.insert(self.db.as_ref()).await?;
        tracing::debug!(lead_id = %model.id, user_id = %model.user_id, "Inserted lead");
        Ok(model)
    }

    pub async fn update(&self, lead: lead::ActiveModel) -> Result<lead::Model, CrmError> {
        Ok(lead.update(self.db.as_ref()).await?)
    }

    /// Persists a stage move together with its history row and interaction.
    pub async fn record_move(
        &self,
        lead: lead::ActiveModel,
        history: lead_stage_history::ActiveModel,
        interaction: lead_interaction::ActiveModel,
    ) -> Result<lead::Model, CrmError> {
        let txn = self.db.begin().await?;
        let updated = lead.update(&txn).await?;
        history.insert(&txn).await?;
        interaction.insert(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Persists a follow-up together with its interaction.
    pub async fn record_follow_up(
        &self,
        lead: lead::ActiveModel,
        interaction: lead_interaction::ActiveModel,
    ) -> Result<lead::Model, CrmError> {
        let txn = self.db.begin().await?;
        let updated = lead.update(&txn).await?;
        interaction.insert(&txn).await?;
        txn.commit().await?;
        Ok(updated)
    }

    /// Permanently deletes the lead and its history and interactions.
    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let txn = self.db.begin().await?;

        let result = Lead::delete_many()
            .filter(lead::Column::Id.eq(id))
            .filter(lead::Column::UserId.eq(user_id))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("lead", id));
        }

        LeadStageHistory::delete_many()
            .filter(lead_stage_history::Column::LeadId.eq(id))
            .exec(&txn)
            .await?;
        LeadInteraction::delete_many()
            .filter(lead_interaction::Column::LeadId.eq(id))
            .exec(&txn)
            .await?;

        txn.commit().await?;
        tracing::debug!(lead_id = %id, user_id = %user_id, "Deleted lead");
        Ok(())
    }

    /// Stage history of a lead, newest first.
    pub async fn stage_history(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Vec<lead_stage_history::Model>, CrmError> {
        let rows = LeadStageHistory::find()
            .filter(lead_stage_history::Column::LeadId.eq(lead_id))
            .filter(lead_stage_history::Column::UserId.eq(user_id))
            .order_by_desc(lead_stage_history::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }

    /// Interaction log of a lead, newest first.
    pub async fn interactions(
        &self,
        user_id: Uuid,
        lead_id: Uuid,
    ) -> Result<Vec<lead_interaction::Model>, CrmError> {
        let rows = LeadInteraction::find()
            .filter(lead_interaction::Column::LeadId.eq(lead_id))
            .filter(lead_interaction::Column::UserId.eq(user_id))
            .order_by_desc(lead_interaction::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(rows)
    }
}
