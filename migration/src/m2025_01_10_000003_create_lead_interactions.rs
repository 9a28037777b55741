//! Migration to create the lead_interactions table.
//!
//! Activity log entries written by stage moves and follow-ups.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LeadInteractions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LeadInteractions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LeadInteractions::LeadId).uuid().not_null())
                    .col(ColumnDef::new(LeadInteractions::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(LeadInteractions::TipoInteraccion)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(LeadInteractions::Descripcion).text().null())
                    .col(ColumnDef::new(LeadInteractions::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(LeadInteractions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_lead_interactions_lead_id")
                            .from(LeadInteractions::Table, LeadInteractions::LeadId)
                            .to(Leads::Table, Leads::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_lead_interactions_lead_created")
                    .table(LeadInteractions::Table)
                    .col(LeadInteractions::LeadId)
                    .col(LeadInteractions::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_lead_interactions_lead_created")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(LeadInteractions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LeadInteractions {
    Table,
    Id,
    LeadId,
    UserId,
    TipoInteraccion,
    Descripcion,
    Metadata,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
}
