//! Migration to create the projects table.
//!
//! Projects track delivery work for won clients.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Projects::UserId).uuid().not_null())
                    .col(ColumnDef::new(Projects::LeadId).uuid().null())
                    .col(ColumnDef::new(Projects::Title).text().not_null())
                    .col(ColumnDef::new(Projects::Description).text().null())
                    .col(
                        ColumnDef::new(Projects::Status)
                            .text()
                            .not_null()
                            .default("not_started"),
                    )
                    .col(ColumnDef::new(Projects::StartDate).date().null())
                    .col(ColumnDef::new(Projects::EndDate).date().null())
                    .col(ColumnDef::new(Projects::Budget).double().null())
                    .col(ColumnDef::new(Projects::Kpis).json_binary().null())
                    .col(ColumnDef::new(Projects::DriveFolderUrl).text().null())
                    .col(ColumnDef::new(Projects::RepoUrl).text().null())
                    .col(ColumnDef::new(Projects::FigmaUrl).text().null())
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Projects::UpdatedAt)
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
                    .name("idx_projects_user_status")
                    .table(Projects::Table)
                    .col(Projects::UserId)
                    .col(Projects::Status)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_projects_user_status").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    UserId,
    LeadId,
    Title,
    Description,
    Status,
    StartDate,
    EndDate,
    Budget,
    Kpis,
    DriveFolderUrl,
    RepoUrl,
    FigmaUrl,
    CreatedAt,
    UpdatedAt,
}
