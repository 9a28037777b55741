//! Project repository

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::project::{self, Entity as Project, ProjectStatus};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewProject {
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub kpis: Option<Value>,
    pub drive_folder_url: Option<String>,
    pub repo_url: Option<String>,
    pub figma_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct ProjectPatch {
    pub lead_id: Option<Uuid>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub budget: Option<f64>,
    #[schema(value_type = Option<Object>)]
    pub kpis: Option<Value>,
    pub drive_folder_url: Option<String>,
    pub repo_url: Option<String>,
    pub figma_url: Option<String>,
}

/// KPIs are a flat object of numeric values.
fn validate_kpis(kpis: &Value) -> Result<(), CrmError> {
    let map = kpis
        .as_object()
        .ok_or_else(|| CrmError::validation("kpis", "kpis must be an object"))?;
    if let Some((name, _)) = map.iter().find(|(_, value)| !value.is_number()) {
        return Err(CrmError::validation(
            "kpis",
            format!("kpi '{}' must be a number", name),
        ));
    }
    Ok(())
}

fn validate_budget(budget: Option<f64>) -> Result<(), CrmError> {
    match budget {
        Some(b) if !b.is_finite() || b < 0.0 => {
            Err(CrmError::validation("budget", "budget must be a non-negative number"))
        }
        _ => Ok(()),
    }
}

fn validate_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), CrmError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(CrmError::validation(
            "end_date",
            "end_date must not be before start_date",
        )),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct ProjectRepository {
    db: Arc<DatabaseConnection>,
}

impl ProjectRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(&self, user_id: Uuid, new: NewProject) -> Result<project::Model, CrmError> {
        if new.title.trim().is_empty() {
            return Err(CrmError::validation("title", "title is required"));
        }
        validate_budget(new.budget)?;
        validate_dates(new.start_date, new.end_date)?;
        let kpis = new.kpis.unwrap_or_else(|| Value::Object(Default::default()));
        validate_kpis(&kpis)?;

        let now = Utc::now();
        let model = project::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            lead_id: Set(new.lead_id),
            title: Set(new.title.trim().to_string()),
            description: Set(new.description),
            status: Set(new.status),
            start_date: Set(new.start_date),
            end_date: Set(new.end_date),
            budget: Set(new.budget),
            kpis: Set(Some(kpis)),
            drive_folder_url: Set(new.drive_folder_url),
            repo_url: Set(new.repo_url),
            figma_url: Set(new.figma_url),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model)
    }

    /// Projects, newest first.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<project::Model>, CrmError> {
        let projects = Project::find()
            .filter(project::Column::UserId.eq(user_id))
            .order_by_desc(project::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        Ok(projects)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<project::Model, CrmError> {
        Project::find_by_id(id)
            .filter(project::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CrmError::not_found("project", id))
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: ProjectPatch,
    ) -> Result<project::Model, CrmError> {
        let current = self.get(user_id, id).await?;
        validate_budget(patch.budget)?;
        validate_dates(
            patch.start_date.or(current.start_date),
            patch.end_date.or(current.end_date),
        )?;
        if let Some(kpis) = &patch.kpis {
            validate_kpis(kpis)?;
        }

        let mut active = current.into_active_model();
        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(CrmError::validation("title", "title is required"));
            }
            active.title = Set(title.trim().to_string());
        }
        if let Some(lead_id) = patch.lead_id {
            active.lead_id = Set(Some(lead_id));
        }
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(start_date) = patch.start_date {
            active.start_date = Set(Some(start_date));
        }
        if let Some(end_date) = patch.end_date {
            active.end_date = Set(Some(end_date));
        }
        if let Some(budget) = patch.budget {
            active.budget = Set(Some(budget));
        }
        if let Some(kpis) = patch.kpis {
            active.kpis = Set(Some(kpis));
        }
        if let Some(url) = patch.drive_folder_url {
            active.drive_folder_url = Set(Some(url));
        }
        if let Some(url) = patch.repo_url {
            active.repo_url = Set(Some(url));
        }
        if let Some(url) = patch.figma_url {
            active.figma_url = Set(Some(url));
        }
        active.updated_at = Set(Utc::now().into());

        Ok(active.update(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let result = Project::delete_many()
            .filter(project::Column::Id.eq(id))
            .filter(project::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("project", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kpis_must_be_numeric_object() {
        assert!(validate_kpis(&json!({"visitas": 120, "conversion": 0.04})).is_ok());
        assert!(validate_kpis(&json!({})).is_ok());
        assert!(validate_kpis(&json!({"visitas": "muchas"})).is_err());
        assert!(validate_kpis(&json!([1, 2])).is_err());
    }

    #[test]
    fn budget_and_dates_are_checked() {
        assert!(validate_budget(Some(-1.0)).is_err());
        assert!(validate_budget(None).is_ok());
        let start = NaiveDate::from_ymd_opt(2025, 5, 1);
        let end = NaiveDate::from_ymd_opt(2025, 4, 1);
        assert!(validate_dates(start, end).is_err());
        assert!(validate_dates(end, start).is_ok());
    }
}
