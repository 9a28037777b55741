//! # Adnexum OS
//!
//! Small-business sales CRM: a lead pipeline with follow-up tracking, tasks,
//! a calendar with Google Calendar sync, message templates, projects,
//! gamification, webhook fan-out and a client for the prospecting
//! investigation service.

pub mod auth;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod gamification;
pub mod handlers;
pub mod investigation;
pub mod lead_store;
pub mod models;
pub mod pipeline;
pub mod realtime;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod templates;
pub mod webhook_dispatch;
pub use migration;
