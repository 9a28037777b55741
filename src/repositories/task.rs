//! Task repository

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::task::{self, Entity as Task, TaskPriority};

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewTask {
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: TaskPriority,
    pub stage_related: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub priority: Option<TaskPriority>,
    pub stage_related: Option<String>,
    pub lead_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskFilter {
    pub lead_id: Option<Uuid>,
    pub completed: Option<bool>,
}

fn validate_title(title: &str) -> Result<(), CrmError> {
    if title.trim().is_empty() {
        return Err(CrmError::validation("title", "title is required"));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct TaskRepository {
    db: Arc<DatabaseConnection>,
}

impl TaskRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn active_model(user_id: Uuid, new: NewTask) -> task::ActiveModel {
        task::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            lead_id: Set(new.lead_id),
            title: Set(new.title.trim().to_string()),
            description: Set(new.description),
            due_date: Set(new.due_date),
            completed: Set(false),
            completed_at: Set(None),
            priority: Set(new.priority),
            stage_related: Set(new.stage_related),
            created_at: Set(Utc::now().into()),
        }
    }

    pub async fn create(&self, user_id: Uuid, new: NewTask) -> Result<task::Model, CrmError> {
        validate_title(&new.title)?;
        let model = Self::active_model(user_id, new)
            .insert(self.db.as_ref())
            .await?;
        tracing::debug!(task_id = %model.id, user_id = %user_id, "Created task");
        Ok(model)
    }

    /// Inserts several tasks atomically.
    pub async fn create_many(
        &self,
        user_id: Uuid,
        tasks: Vec<NewTask>,
    ) -> Result<Vec<task::Model>, CrmError> {
        for new in &tasks {
            validate_title(&new.title)?;
        }

        let txn = self.db.begin().await?;
        let mut created = Vec::with_capacity(tasks.len());
        for new in tasks {
            created.push(Self::active_model(user_id, new).insert(&txn).await?);
        }
        txn.commit().await?;
        Ok(created)
    }

    /// Tasks ordered by due date, undated tasks last.
    pub async fn list(&self, user_id: Uuid, filter: &TaskFilter) -> Result<Vec<task::Model>, CrmError> {
        let mut query = Task::find().filter(task::Column::UserId.eq(user_id));
        if let Some(lead_id) = filter.lead_id {
            query = query.filter(task::Column::LeadId.eq(lead_id));
        }
        if let Some(completed) = filter.completed {
            query = query.filter(task::Column::Completed.eq(completed));
        }

        let mut tasks = query
            .order_by_asc(task::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?;
        tasks.sort_by_key(|t| (t.due_date.is_none(), t.due_date));
        Ok(tasks)
    }

    pub async fn get(&self, user_id: Uuid, id: Uuid) -> Result<task::Model, CrmError> {
        Task::find_by_id(id)
            .filter(task::Column::UserId.eq(user_id))
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| CrmError::not_found("task", id))
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        id: Uuid,
        patch: TaskPatch,
    ) -> Result<task::Model, CrmError> {
        let mut active = self.get(user_id, id).await?.into_active_model();

        if let Some(title) = patch.title {
            validate_title(&title)?;
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = patch.description {
            active.description = Set(Some(description));
        }
        if let Some(due_date) = patch.due_date {
            active.due_date = Set(Some(due_date));
        }
        if let Some(priority) = patch.priority {
            active.priority = Set(priority);
        }
        if let Some(stage) = patch.stage_related {
            active.stage_related = Set(Some(stage));
        }
        if let Some(lead_id) = patch.lead_id {
            active.lead_id = Set(Some(lead_id));
        }

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Marks a task done or not done; `completed_at` is set exactly when done.
    pub async fn set_completed(
        &self,
        user_id: Uuid,
        id: Uuid,
        completed: bool,
    ) -> Result<task::Model, CrmError> {
        let mut active = self.get(user_id, id).await?.into_active_model();
        active.completed = Set(completed);
        active.completed_at = Set(completed.then(|| Utc::now().into()));
        Ok(active.update(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let result = Task::delete_many()
            .filter(task::Column::Id.eq(id))
            .filter(task::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("task", id));
        }
        Ok(())
    }
}
