//! Local calendar event repository

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::calendar_event::{self, Entity as CalendarEvent, EventType};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NewCalendarEvent {
    pub lead_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    #[serde(default)]
    pub event_type: EventType,
    pub lead_name: Option<String>,
}

/// Optional window on `start_time`, both ends inclusive.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EventWindow {
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone)]
pub struct CalendarEventRepository {
    db: Arc<DatabaseConnection>,
}

impl CalendarEventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        new: NewCalendarEvent,
    ) -> Result<calendar_event::Model, CrmError> {
        if new.title.trim().is_empty() {
            return Err(CrmError::validation("title", "title is required"));
        }
        if new.end_time < new.start_time {
            return Err(CrmError::validation(
                "end_time",
                "end_time must not be before start_time",
            ));
        }

        let model = calendar_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            lead_id: Set(new.lead_id),
            title: Set(new.title.trim().to_string()),
            description: Set(new.description),
            start_time: Set(new.start_time),
            end_time: Set(new.end_time),
            event_type: Set(new.event_type),
            lead_name: Set(new.lead_name),
            created_at: Set(Utc::now().into()),
        }
        .insert(self.db.as_ref())
        .await?;
        Ok(model)
    }

    /// Events ordered by start time.
    pub async fn list(
        &self,
        user_id: Uuid,
        window: &EventWindow,
    ) -> Result<Vec<calendar_event::Model>, CrmError> {
        let mut query = CalendarEvent::find().filter(calendar_event::Column::UserId.eq(user_id));
        if let Some(start) = window.start {
            query = query.filter(calendar_event::Column::StartTime.gte(start));
        }
        if let Some(end) = window.end {
            query = query.filter(calendar_event::Column::StartTime.lte(end));
        }

        let events = query
            .order_by_asc(calendar_event::Column::StartTime)
            .all(self.db.as_ref())
            .await?;
        Ok(events)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), CrmError> {
        let result = CalendarEvent::delete_many()
            .filter(calendar_event::Column::Id.eq(id))
            .filter(calendar_event::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(CrmError::not_found("calendar event", id));
        }
        Ok(())
    }
}
