//! Migration to create the webhook_configs table.
//!
//! Each row is an outbound subscriber endpoint with the event names it listens to.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(WebhookConfigs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WebhookConfigs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(WebhookConfigs::UserId).uuid().not_null())
                    .col(ColumnDef::new(WebhookConfigs::Url).text().not_null())
                    .col(ColumnDef::new(WebhookConfigs::Events).json_binary().not_null())
                    .col(
                        ColumnDef::new(WebhookConfigs::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(WebhookConfigs::CreatedAt)
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
                    .name("idx_webhook_configs_user_active")
                    .table(WebhookConfigs::Table)
                    .col(WebhookConfigs::UserId)
                    .col(WebhookConfigs::Active)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_webhook_configs_user_active")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(WebhookConfigs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum WebhookConfigs {
    Table,
    Id,
    UserId,
    Url,
    Events,
    Active,
    CreatedAt,
}
