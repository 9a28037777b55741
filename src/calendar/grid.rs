//! Month grid and upcoming list for the calendar view.
//!
//! Events come from three places: lead milestones (discovery, sale, next
//! follow-up), task due dates and locally stored calendar events. Each is
//! reduced to a dated [`GridEvent`] in the user's local time.

use std::ops::RangeInclusive;

use chrono::{Datelike, Days, Duration, FixedOffset, NaiveDate};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::CrmError;
use crate::models::{calendar_event, lead, task};

pub const GRID_CELLS: usize = 42;
/// Years the month grid accepts.
pub const GRID_YEARS: RangeInclusive<i32> = 1..=9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GridEventKind {
    Discovery,
    Venta,
    Followup,
    Task,
    Event,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GridEvent {
    pub date: NaiveDate,
    pub title: String,
    pub kind: GridEventKind,
    pub lead_id: Option<Uuid>,
    pub lead_name: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub day: u32,
    pub is_current_month: bool,
    pub is_today: bool,
    pub events: Vec<GridEvent>,
}

/// Flattens leads, tasks and stored events into dated grid events.
pub fn collect_events(
    leads: &[lead::Model],
    tasks: &[task::Model],
    stored: &[calendar_event::Model],
    offset: FixedOffset,
) -> Vec<GridEvent> {
    let mut events = Vec::new();

    for lead in leads {
        let milestone = |date: NaiveDate, kind: GridEventKind, label: &str| GridEvent {
            date,
            title: format!("{}: {}", label, lead.business_name),
            kind,
            lead_id: Some(lead.id),
            lead_name: Some(lead.business_name.clone()),
            completed: false,
        };
        if let Some(at) = lead.fecha_discovery {
            let date = at.with_timezone(&offset).date_naive();
            events.push(milestone(date, GridEventKind::Discovery, "Discovery"));
        }
        if let Some(at) = lead.fecha_venta {
            let date = at.with_timezone(&offset).date_naive();
            events.push(milestone(date, GridEventKind::Venta, "Venta"));
        }
        if let Some(date) = lead.fecha_proximo_followup {
            events.push(milestone(date, GridEventKind::Followup, "Follow-up"));
        }
    }

    events.extend(tasks.iter().filter_map(|task| {
        task.due_date.map(|date| GridEvent {
            date,
            title: task.title.clone(),
            kind: GridEventKind::Task,
            lead_id: task.lead_id,
            lead_name: None,
            completed: task.completed,
        })
    }));

    events.extend(stored.iter().map(|event| GridEvent {
        date: event.start_time.with_timezone(&offset).date_naive(),
        title: event.title.clone(),
        kind: GridEventKind::Event,
        lead_id: event.lead_id,
        lead_name: event.lead_name.clone(),
        completed: false,
    }));

    events
}

/// Six Monday-start weeks covering `month` of `year`.
///
/// Days before the first and after the last of the month are padding from
/// the neighbouring months.
pub fn month_grid(
    year: i32,
    month: u32,
    today: NaiveDate,
    events: &[GridEvent],
) -> Result<Vec<CalendarDay>, CrmError> {
    if !GRID_YEARS.contains(&year) {
        return Err(CrmError::validation(
            "year",
            format!("year must be between {} and {}", GRID_YEARS.start(), GRID_YEARS.end()),
        ));
    }
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| CrmError::validation("month", format!("invalid month {}-{}", year, month)))?;
    let lead_in = Days::new(u64::from(first.weekday().num_days_from_monday()));
    let start = first
        .checked_sub_days(lead_in)
        .ok_or_else(|| CrmError::validation("year", format!("year {} is out of range", year)))?;

    Ok(start
        .iter_days()
        .take(GRID_CELLS)
        .map(|date| CalendarDay {
            date,
            day: date.day(),
            is_current_month: date.month() == month && date.year() == year,
            is_today: date == today,
            events: events.iter().filter(|e| e.date == date).cloned().collect(),
        })
        .collect())
}

/// Open events dated from `today` through `today + days`, earliest first.
pub fn upcoming(events: &[GridEvent], today: NaiveDate, days: i64) -> Vec<GridEvent> {
    let last = today + Duration::days(days);
    let mut upcoming: Vec<GridEvent> = events
        .iter()
        .filter(|e| !e.completed && e.date >= today && e.date <= last)
        .cloned()
        .collect();
    upcoming.sort_by_key(|e| e.date);
    upcoming
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::lead as lead_fixture;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn event(on: NaiveDate, completed: bool) -> GridEvent {
        GridEvent {
            date: on,
            title: "x".into(),
            kind: GridEventKind::Task,
            lead_id: None,
            lead_name: None,
            completed,
        }
    }

    #[test]
    fn grid_starts_on_monday_and_has_42_cells() {
        // March 2025 starts on a Saturday
        let grid = month_grid(2025, 3, date(2025, 3, 15), &[]).unwrap();
        assert_eq!(grid.len(), GRID_CELLS);
        assert_eq!(grid[0].date, date(2025, 2, 24));
        assert!(!grid[0].is_current_month);
        assert_eq!(grid[5].date, date(2025, 3, 1));
        assert!(grid[5].is_current_month);
        assert!(grid.iter().filter(|d| d.is_today).count() == 1);
        assert!(!grid[41].is_current_month);
    }

    #[test]
    fn grid_for_month_starting_monday_has_no_lead_in() {
        // September 2025 starts on a Monday
        let grid = month_grid(2025, 9, date(2025, 1, 1), &[]).unwrap();
        assert_eq!(grid[0].date, date(2025, 9, 1));
        assert!(grid.iter().all(|d| !d.is_today));
    }

    #[test]
    fn grid_rejects_invalid_month() {
        assert!(month_grid(2025, 13, date(2025, 1, 1), &[]).is_err());
    }

    #[test]
    fn grid_rejects_years_outside_range_without_panicking() {
        let today = date(2025, 1, 1);
        for year in [NaiveDate::MIN.year(), 0, 10_000, NaiveDate::MAX.year()] {
            assert!(matches!(
                month_grid(year, 1, today, &[]),
                Err(CrmError::Validation { .. })
            ));
        }
        assert_eq!(month_grid(1, 1, today, &[]).unwrap().len(), GRID_CELLS);
        assert_eq!(month_grid(9999, 12, today, &[]).unwrap().len(), GRID_CELLS);
    }

    #[test]
    fn grid_places_events_on_their_day() {
        let events = vec![event(date(2025, 3, 10), false)];
        let grid = month_grid(2025, 3, date(2025, 3, 1), &events).unwrap();
        let cell = grid.iter().find(|d| d.date == date(2025, 3, 10)).unwrap();
        assert_eq!(cell.events.len(), 1);
    }

    #[test]
    fn upcoming_skips_completed_and_out_of_window() {
        let today = date(2025, 3, 10);
        let events = vec![
            event(date(2025, 3, 17), false),
            event(date(2025, 3, 11), false),
            event(date(2025, 3, 12), true),
            event(date(2025, 3, 18), false),
            event(date(2025, 3, 9), false),
        ];
        let list = upcoming(&events, today, 7);
        let dates: Vec<_> = list.iter().map(|e| e.date).collect();
        assert_eq!(dates, vec![date(2025, 3, 11), date(2025, 3, 17)]);
    }

    #[test]
    fn collect_events_uses_local_dates() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let mut lead = lead_fixture("Bar", "discovery_agendado");
        // 01:00 UTC on the 11th is still the 10th in UTC-3
        lead.fecha_discovery = Some(
            chrono::Utc
                .with_ymd_and_hms(2025, 3, 11, 1, 0, 0)
                .unwrap()
                .fixed_offset(),
        );
        lead.fecha_proximo_followup = Some(date(2025, 3, 14));
        let events = collect_events(&[lead], &[], &[], offset);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, GridEventKind::Discovery);
        assert_eq!(events[0].date, date(2025, 3, 10));
        assert_eq!(events[0].title, "Discovery: Bar");
        assert_eq!(events[1].kind, GridEventKind::Followup);
    }
}
