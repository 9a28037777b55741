//! Shared fixtures for integration tests.
//!
//! Every test gets its own in-memory SQLite database with all migrations
//! applied. The pool is capped at one connection so the schema survives.

#![allow(dead_code)]

use std::sync::Arc;

use adnexum::config::AppConfig;
use adnexum::lead_store::{LeadStore, NewLead};
use adnexum::realtime::ChangeFeed;
use adnexum::repositories::{LeadRepository, WebhookConfigRepository};
use adnexum::webhook_dispatch::WebhookDispatcher;
use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio_util::task::TaskTracker;

pub const TEST_TOKEN: &str = "test-token";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<Arc<DatabaseConnection>> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await?;
    Migrator::up(&db, None).await?;
    Ok(Arc::new(db))
}

/// Configuration with a single API token and short webhook timeouts.
pub fn test_config() -> AppConfig {
    AppConfig {
        api_tokens: vec![TEST_TOKEN.to_string()],
        webhook_timeout_ms: 500,
        utc_offset_minutes: 0,
        ..AppConfig::default()
    }
}

/// A lead store wired to `db` whose webhook fan-outs run on `tracker`.
pub fn lead_store_on(
    db: &Arc<DatabaseConnection>,
    config: &AppConfig,
    tracker: TaskTracker,
) -> Result<LeadStore> {
    let webhooks = WebhookConfigRepository::new(Arc::clone(db));
    let dispatcher = WebhookDispatcher::new(config, webhooks)?;
    Ok(LeadStore::new(
        LeadRepository::new(Arc::clone(db)),
        ChangeFeed::new(),
        dispatcher,
        tracker,
        config.local_offset(),
    ))
}

pub fn lead_store(db: &Arc<DatabaseConnection>, config: &AppConfig) -> Result<LeadStore> {
    lead_store_on(db, config, TaskTracker::new())
}

/// Waits for every background fan-out scheduled on `tracker`.
pub async fn drain(tracker: &TaskTracker) {
    tracker.close();
    tracker.wait().await;
}

pub fn new_lead(name: &str) -> NewLead {
    NewLead {
        business_name: name.to_string(),
        ..NewLead::default()
    }
}

pub fn new_lead_with_phone(name: &str, phone: &str) -> NewLead {
    NewLead {
        business_name: name.to_string(),
        business_phone: Some(phone.to_string()),
        ..NewLead::default()
    }
}
