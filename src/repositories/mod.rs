//! # Repository Layer
//!
//! SeaORM access per table. Every method takes the owning user id and never
//! returns or touches another user's rows.

pub mod calendar_event;
pub mod google_calendar_token;
pub mod lead;
pub mod message_template;
pub mod project;
pub mod task;
pub mod webhook_config;

pub use calendar_event::CalendarEventRepository;
pub use google_calendar_token::GoogleCalendarTokenRepository;
pub use lead::LeadRepository;
pub use message_template::MessageTemplateRepository;
pub use project::ProjectRepository;
pub use task::TaskRepository;
pub use webhook_config::WebhookConfigRepository;
