//! Migration to create the google_calendar_tokens table.
//!
//! One row per user holding the OAuth token pair for Google Calendar.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GoogleCalendarTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GoogleCalendarTokens::UserId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendarTokens::AccessToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendarTokens::RefreshToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendarTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendarTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GoogleCalendarTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GoogleCalendarTokens {
    Table,
    UserId,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    UpdatedAt,
}
