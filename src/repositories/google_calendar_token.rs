//! Google Calendar token repository
//!
//! One row per user. Presence of a row is what "connected" means.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    Set, sea_query::OnConflict,
};
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::google_calendar_token::{self, Entity as GoogleCalendarToken};

#[derive(Debug, Clone)]
pub struct GoogleCalendarTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl GoogleCalendarTokenRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn find(
        &self,
        user_id: Uuid,
    ) -> Result<Option<google_calendar_token::Model>, CrmError> {
        Ok(GoogleCalendarToken::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Inserts or replaces the token pair for the user.
    pub async fn upsert(
        &self,
        user_id: Uuid,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), CrmError> {
        let row = google_calendar_token::ActiveModel {
            user_id: Set(user_id),
            access_token: Set(access_token.to_string()),
            refresh_token: Set(refresh_token.to_string()),
            expires_at: Set(expires_at.into()),
            updated_at: Set(Utc::now().into()),
        };

        GoogleCalendarToken::insert(row)
            .on_conflict(
                OnConflict::column(google_calendar_token::Column::UserId)
                    .update_columns([
                        google_calendar_token::Column::AccessToken,
                        google_calendar_token::Column::RefreshToken,
                        google_calendar_token::Column::ExpiresAt,
                        google_calendar_token::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Stores a refreshed access token, keeping the refresh token.
    pub async fn update_access_token(
        &self,
        token: google_calendar_token::Model,
        access_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<google_calendar_token::Model, CrmError> {
        let mut active = token.into_active_model();
        active.access_token = Set(access_token.to_string());
        active.expires_at = Set(expires_at.into());
        active.updated_at = Set(Utc::now().into());
        Ok(active.update(self.db.as_ref()).await?)
    }

    pub async fn delete(&self, user_id: Uuid) -> Result<(), CrmError> {
        GoogleCalendarToken::delete_many()
            .filter(google_calendar_token::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        tracing::info!(user_id = %user_id, "Removed Google Calendar tokens");
        Ok(())
    }
}
