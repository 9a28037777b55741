//! # Pipeline
//!
//! Pure views over lead snapshots: the stage catalog, read-time derived
//! fields, the kanban board, the daily follow-up queue and dashboard metrics.

pub mod board;
pub mod derived;
pub mod followup;
pub mod stages;
pub mod summary;

pub use board::{BoardFilter, GroupedLeads, PendingMove, PipelineBoard, StageColumn, group_by_stage};
pub use derived::{LeadView, days_since_contact, derive, derive_all};
pub use followup::{FollowUpQueue, build_queue};
pub use stages::Stage;
pub use summary::{DashboardSummary, summarize};
