//! Database migrations for the Adnexum CRM service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_leads;
mod m2025_01_10_000002_create_lead_stage_history;
mod m2025_01_10_000003_create_lead_interactions;
mod m2025_01_12_000001_create_tasks;
mod m2025_01_12_000002_create_webhook_configs;
mod m2025_01_15_000001_create_calendar_events;
mod m2025_01_15_000002_create_google_calendar_tokens;
mod m2025_01_20_000001_create_message_templates;
mod m2025_01_20_000002_create_projects;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_leads::Migration),
            Box::new(m2025_01_10_000002_create_lead_stage_history::Migration),
            Box::new(m2025_01_10_000003_create_lead_interactions::Migration),
            Box::new(m2025_01_12_000001_create_tasks::Migration),
            Box::new(m2025_01_12_000002_create_webhook_configs::Migration),
            Box::new(m2025_01_15_000001_create_calendar_events::Migration),
            Box::new(m2025_01_15_000002_create_google_calendar_tokens::Migration),
            Box::new(m2025_01_20_000001_create_message_templates::Migration),
            Box::new(m2025_01_20_000002_create_projects::Migration),
        ]
    }
}
