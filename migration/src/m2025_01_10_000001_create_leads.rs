//! Migration to create the leads table.
//!
//! Leads are owner-scoped prospects tracked through the sales pipeline, carrying
//! contact data, pipeline classification and follow-up bookkeeping.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Leads::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Leads::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Leads::UserId).uuid().not_null())
                    .col(ColumnDef::new(Leads::BusinessName).text().not_null())
                    .col(ColumnDef::new(Leads::OwnerName).text().null())
                    .col(ColumnDef::new(Leads::BusinessPhone).text().null())
                    .col(ColumnDef::new(Leads::OwnerPhone).text().null())
                    .col(ColumnDef::new(Leads::Email).text().null())
                    .col(ColumnDef::new(Leads::Instagram).text().null())
                    .col(ColumnDef::new(Leads::Website).text().null())
                    .col(ColumnDef::new(Leads::Rubro).text().null())
                    .col(ColumnDef::new(Leads::Ciudad).text().null())
                    .col(
                        ColumnDef::new(Leads::TipoCliente)
                            .text()
                            .not_null()
                            .default("industrial"),
                    )
                    .col(
                        ColumnDef::new(Leads::Fuente)
                            .text()
                            .not_null()
                            .default("whatsapp"),
                    )
                    .col(ColumnDef::new(Leads::TipoNegocio).text().null())
                    .col(
                        ColumnDef::new(Leads::EstadoActual)
                            .text()
                            .not_null()
                            .default("nuevo_lead"),
                    )
                    .col(
                        ColumnDef::new(Leads::NivelInteres)
                            .text()
                            .not_null()
                            .default("frio"),
                    )
                    .col(
                        ColumnDef::new(Leads::PotencialVenta)
                            .text()
                            .not_null()
                            .default("medio"),
                    )
                    .col(
                        ColumnDef::new(Leads::ValorEstimadoUsd)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Leads::MontoPropuesta)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(Leads::FechaUltimaInteraccion)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Leads::FechaProximoFollowup).date().null())
                    .col(
                        ColumnDef::new(Leads::ContadorSeguimientos)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Leads::FollowUpIntervalDays)
                            .integer()
                            .not_null()
                            .default(3),
                    )
                    .col(
                        ColumnDef::new(Leads::SeguidoHoy)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Leads::SeguidoHoyFecha).date().null())
                    .col(
                        ColumnDef::new(Leads::SeguimientoActivo)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Leads::MicroDiscoveryCompletado)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Leads::FechaDiscovery)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Leads::FechaVenta)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Leads::LoomUrl).text().null())
                    .col(ColumnDef::new(Leads::PropuestaUrl).text().null())
                    .col(ColumnDef::new(Leads::PropuestaPdfUrl).text().null())
                    .col(ColumnDef::new(Leads::NotasNegocioUrl).text().null())
                    .col(ColumnDef::new(Leads::Notas).text().null())
                    .col(ColumnDef::new(Leads::SopLinks).json_binary().null())
                    .col(
                        ColumnDef::new(Leads::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Leads::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Pipeline board and follow-up queue both scan by owner and stage
        manager
            .create_index(
                Index::create()
                    .name("idx_leads_user_stage")
                    .table(Leads::Table)
                    .col(Leads::UserId)
                    .col(Leads::EstadoActual)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_leads_user_next_followup")
                    .table(Leads::Table)
                    .col(Leads::UserId)
                    .col(Leads::FechaProximoFollowup)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_leads_user_next_followup").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_leads_user_stage").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Leads::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Leads {
    Table,
    Id,
    UserId,
    BusinessName,
    OwnerName,
    BusinessPhone,
    OwnerPhone,
    Email,
    Instagram,
    Website,
    Rubro,
    Ciudad,
    TipoCliente,
    Fuente,
    TipoNegocio,
    EstadoActual,
    NivelInteres,
    PotencialVenta,
    ValorEstimadoUsd,
    MontoPropuesta,
    FechaUltimaInteraccion,
    FechaProximoFollowup,
    ContadorSeguimientos,
    FollowUpIntervalDays,
    SeguidoHoy,
    SeguidoHoyFecha,
    SeguimientoActivo,
    MicroDiscoveryCompletado,
    FechaDiscovery,
    FechaVenta,
    LoomUrl,
    PropuestaUrl,
    PropuestaPdfUrl,
    NotasNegocioUrl,
    Notas,
    SopLinks,
    CreatedAt,
    UpdatedAt,
}
