//! Migration to create the lead_stage_history table.
//!
//! Append-only audit trail of pipeline stage transitions.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LeadStageHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LeadStageHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LeadStageHistory::LeadId).uuid().not_null())
                    .col(ColumnDef::new(LeadStageHistory::UserId).uuid().not_null())
                    .col(ColumnDef::new(LeadStageHistory::PreviousStage).text().null())
                    .col(ColumnDef::new(LeadStageHistory::NewStage).text().not_null())
                    .col(ColumnDef::new(LeadStageHistory::Notes).text().null())
                    .col(
                        ColumnDef::new(LeadStageHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lead_stage_history_lead_id")
                            .from(LeadStageHistory::Table, LeadStageHistory::LeadId)
                            .to(Leads::Table, Leads::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lead_stage_history_lead_created")
                    .table(LeadStageHistory::Table)
                    .col(LeadStageHistory::LeadId)
                    .col(LeadStageHistory::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lead_stage_history_lead_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(LeadStageHistory::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LeadStageHistory {
    Table,
    Id,
    LeadId,
    UserId,
    PreviousStage,
    NewStage,
    Notes,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
}
