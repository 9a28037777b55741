//! Message template repository

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::message_template::{self, Entity as MessageTemplate, TemplateType};
use crate::templates::{self, DEFAULT_TEMPLATES};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewTemplate {
    pub stage: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub template_type: TemplateType,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TemplatePatch {
    pub stage: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub template_type: Option<TemplateType>,
}

fn validate_stage(stage: &str) -> Result<(), CrmError> {
    if !templates::is_category(stage) {
        return Err(CrmError::validation(
            "stage",
            format!("unknown template category '{}'", stage),
        ));
    }
    Ok(())
}

fn validate_text(field: &'static str, value: &str) -> Result<(), CrmError> {
    if value.trim().is_empty() {
        return Err(CrmError::validation(field, format!("{} is required", field)));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct MessageTemplateRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageTemplateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        new: NewTemplate,
    ) -> Result<message_template::Model, CrmError> {
        validate_stage(&new.stage)?;
        validate_text("title", &new.title)?;
        validate_text("content", &new.content)?;

        let model = message_template::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            stage: Set(new.stage),
            title: Set(new.title.trim().to_string()),
            content: Set(new.content),
            template_type: Set(new.template_type),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model)
    }

    /// Adds the built-in templates to the user's set.
    pub async fn seed_defaults(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<message_template::Model>, CrmError> {
        let txn = self.db.begin().await?;
        let mut created = Vec::with_capacity(DEFAULT_TEMPLATES.len());
        for template in &DEFAULT_TEMPLATES {
            let model = message_template::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                stage: Set(template.category.to_string()),
                title: Set(template.title.to_string()),
                content: Set(template.content.to_string()),
                template_type: Set(template.template_type),
                created_at: Set(Utc::now().into()),
            }
            .insert(&txn)
            .await?;
            created.push(model);
        }
        txn.commit().await?;
        tracing::info!(user_id = %user_id, count = created.len(), "Seeded default templates");
        Ok(created)
    }

    /// Templates ordered by category, then creation.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<message_template::Model>, CrmError> {
        let templates = MessageTemplate::find()
            .filter(message_template::Column::UserId.eq(user_id))
            .order_by_asc(message_template::Column::Stage)
            .order_by_asc(message_template::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(templates)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<message_template::Model, CrmError> {
        MessageTemplate::find_by_id(id)
            .filter(message_template::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CrmError::not_found("template", id))
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TemplatePatch,
    ) -> Result<message_template::Model, CrmError> {
        let mut active = self.get(user_id, id).await?.into_active_model();

        if let Some(stage) = patch.stage {
            validate_stage(&stage)?;
            active.stage = Set(stage);
        }
        if let Some(title) = patch.title {
            validate_text("title", &title)?;
            active.title = Set(title.trim().to_string());
        }
        if let Some(content) = patch.content {
            validate_text("content", &content)?;
            active.content = Set(content);
        }
        if let Some(template_type) = patch.template_type {
            active.template_type = Set(template_type);
        }

        Ok(active.update(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let result = MessageTemplate::delete_many()
            .filter(message_template::Column::Id.eq(id))
            .filter(message_template::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("template", id));
        }
        Ok(())
    }
}
