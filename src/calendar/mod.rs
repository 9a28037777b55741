//! # Calendar
//!
//! The local month grid built from leads, tasks and stored events, and the
//! optional Google Calendar link.

pub mod google;
pub mod grid;

pub use google::{GoogleCalendarService, GoogleError, GoogleEvent, GoogleEventList, NewGoogleEvent};
pub use grid::{CalendarDay, GridEvent, GridEventKind, collect_events, month_grid, upcoming};
