//! # Data Models
//!
//! SeaORM entities for the CRM tables plus small shared response types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod calendar_event;
pub mod google_calendar_token;
pub mod lead;
pub mod lead_interaction;
pub mod lead_stage_history;
pub mod message_template;
pub mod project;
pub mod task;
pub mod webhook_config;

pub use calendar_event::Entity as CalendarEvent;
pub use google_calendar_token::Entity as GoogleCalendarToken;
pub use lead::Entity as Lead;
pub use lead_interaction::Entity as LeadInteraction;
pub use lead_stage_history::Entity as LeadStageHistory;
pub use message_template::Entity as MessageTemplate;
pub use project::Entity as Project;
pub use task::Entity as Task;
pub use webhook_config::Entity as WebhookConfig;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "adnexum-crm".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
