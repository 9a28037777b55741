//! Migration to create the calendar_events table (locally scheduled meetings).

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CalendarEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CalendarEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CalendarEvents::UserId).uuid().not_null())
                    .col(ColumnDef::new(CalendarEvents::LeadId).uuid().null())
                    .col(ColumnDef::new(CalendarEvents::Title).text().not_null())
                    .col(ColumnDef::new(CalendarEvents::Description).text().null())
                    .col(
                        ColumnDef::new(CalendarEvents::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CalendarEvents::EndTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CalendarEvents::EventType)
                            .text()
                            .not_null()
                            .default("otro"),
                    )
                    .col(ColumnDef::new(CalendarEvents::LeadName).text().null())
                    .col(
                        ColumnDef::new(CalendarEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_calendar_events_user_start")
                    .table(CalendarEvents::Table)
                    .col(CalendarEvents::UserId)
                    .col(CalendarEvents::StartTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_calendar_events_user_start")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(CalendarEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CalendarEvents {
    Table,
    Id,
    UserId,
    LeadId,
    Title,
    Description,
    StartTime,
    EndTime,
    EventType,
    LeadName,
    CreatedAt,
}
