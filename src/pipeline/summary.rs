//! Dashboard metrics over the user's pipeline.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::derived::{LeadView, local_today};
use super::stages::{self, LOST, WON};
use crate::models::{calendar_event, task};

const PROPOSAL_STAGES: [&str; 2] = ["loom_enviado", "venta_agendada"];

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageCount {
    pub stage: &'static str,
    pub label: &'static str,
    pub count: usize,
}

/// Targets for the daily prospecting routine.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct DailyKpiTargets {
    pub mensajes_enviados: u32,
    pub respuestas_recibidas: u32,
    pub llamadas_agendadas: u32,
    pub llamadas_realizadas: u32,
    pub propuestas_enviadas: u32,
    pub cierres: u32,
}

pub const DAILY_KPI_TARGETS: DailyKpiTargets = DailyKpiTargets {
    mensajes_enviados: 20,
    respuestas_recibidas: 5,
    llamadas_agendadas: 3,
    llamadas_realizadas: 2,
    propuestas_enviadas: 1,
    cierres: 0,
};

/// Percentage of `target` reached, capped at 100.
pub fn kpi_progress(current: u32, target: u32) -> u8 {
    if target == 0 {
        return 0;
    }
    ((current as f64 / target as f64) * 100.0).round().min(100.0) as u8
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSummary {
    pub active_leads: usize,
    pub hot_leads: usize,
    pub urgent_leads: usize,
    pub not_contacted_today: usize,
    pub contacts_today: usize,
    pub won_count: usize,
    pub won_amount: f64,
    pub pending_tasks: usize,
    pub events_today: usize,
    pub meetings_next_7_days: usize,
    pub proposals: usize,
    /// Discovery or sale dates on/after the local start of the week (Sunday)
    pub meetings_this_week: usize,
    pub won_this_month: usize,
    pub won_amount_this_month: f64,
    pub stage_counts: Vec<StageCount>,
    pub kpi_targets: DailyKpiTargets,
}

fn within(date: Option<DateTime<FixedOffset>>, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    date.map(|d| d.with_timezone(&Utc))
        .is_some_and(|d| d >= from && d <= to)
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    offset
        .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
        .single()
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|| date.and_time(chrono::NaiveTime::MIN).and_utc())
}

fn on_or_after(date: Option<DateTime<FixedOffset>>, since: DateTime<Utc>) -> bool {
    date.is_some_and(|d| d.with_timezone(&Utc) >= since)
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

pub fn summarize(
    leads: &[LeadView],
    tasks: &[task::Model],
    events: &[calendar_event::Model],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> DashboardSummary {
    let today = local_today(now, offset);
    let week_end = now + Duration::days(7);
    let active: Vec<&LeadView> = leads
        .iter()
        .filter(|v| !stages::is_terminal(&v.lead.estado_actual))
        .collect();
    let won: Vec<&LeadView> = leads.iter().filter(|v| v.lead.estado_actual == WON).collect();
    let week_start = local_midnight(
        today - Duration::days(i64::from(today.weekday().num_days_from_sunday())),
        offset,
    );
    let month_start = local_midnight(today.with_day(1).unwrap_or(today), offset);
    let won_this_month: Vec<&&LeadView> = won
        .iter()
        .filter(|v| v.lead.updated_at.with_timezone(&Utc) >= month_start)
        .collect();

    let stage_counts = stages::catalog()
        .iter()
        .filter(|stage| stage.id != LOST)
        .map(|stage| StageCount {
            stage: stage.id,
            label: stage.label,
            count: leads.iter().filter(|v| v.lead.estado_actual == stage.id).count(),
        })
        .collect();

    DashboardSummary {
        active_leads: active.len(),
        hot_leads: active
            .iter()
            .filter(|v| v.lead.nivel_interes == crate::models::lead::NivelInteres::Caliente)
            .count(),
        urgent_leads: active.iter().filter(|v| v.is_urgent).count(),
        not_contacted_today: active
            .iter()
            .filter(|v| v.lead.seguimiento_activo && !v.lead.seguido_hoy)
            .count(),
        contacts_today: leads.iter().filter(|v| v.lead.seguido_hoy).count(),
        won_count: won.len(),
        won_amount: won.iter().map(|v| v.lead.monto_propuesta).sum(),
        pending_tasks: tasks.iter().filter(|t| !t.completed).count(),
        events_today: events
            .iter()
            .filter(|e| e.start_time.with_timezone(&offset).date_naive() == today)
            .count(),
        meetings_next_7_days: leads
            .iter()
            .filter(|v| {
                within(v.lead.fecha_discovery, now, week_end)
                    || within(v.lead.fecha_venta, now, week_end)
            })
            .count(),
        proposals: leads
            .iter()
            .filter(|v| {
                has_text(v.lead.propuesta_url.as_deref())
                    || PROPOSAL_STAGES.contains(&v.lead.estado_actual.as_str())
            })
            .count(),
        meetings_this_week: leads
            .iter()
            .filter(|v| {
                on_or_after(v.lead.fecha_discovery, week_start)
                    || on_or_after(v.lead.fecha_venta, week_start)
            })
            .count(),
        won_this_month: won_this_month.len(),
        won_amount_this_month: won_this_month.iter().map(|v| v.lead.monto_propuesta).sum(),
        stage_counts,
        kpi_targets: DAILY_KPI_TARGETS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::view;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap()
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn counts_active_won_and_proposals() {
        let mut won = view("Won", WON);
        won.lead.monto_propuesta = 1500.0;
        let mut proposal = view("Prop", "mensaje_enviado");
        proposal.lead.propuesta_url = Some("https://docs.example/p".into());
        let loom = view("Loom", "loom_enviado");
        let lost = view("Lost", LOST);

        let summary = summarize(&[won, proposal, loom, lost], &[], &[], now(), offset());
        assert_eq!(summary.active_leads, 2);
        assert_eq!(summary.won_count, 1);
        assert!((summary.won_amount - 1500.0).abs() < f64::EPSILON);
        assert_eq!(summary.proposals, 2);
        assert!(summary.stage_counts.iter().all(|c| c.stage != LOST));
        assert_eq!(summary.stage_counts.len(), stages::catalog().len() - 1);
    }

    #[test]
    fn meetings_window_is_next_seven_days() {
        let mut soon = view("Soon", "discovery_agendada");
        soon.lead.fecha_discovery = Some((now() + Duration::days(2)).fixed_offset());
        let mut later = view("Later", "venta_agendada");
        later.lead.fecha_venta = Some((now() + Duration::days(9)).fixed_offset());
        let mut past = view("Past", "discovery_realizada");
        past.lead.fecha_discovery = Some((now() - Duration::days(1)).fixed_offset());

        let summary = summarize(&[soon, later, past], &[], &[], now(), offset());
        assert_eq!(summary.meetings_next_7_days, 1);
    }

    #[test]
    fn period_metrics_use_local_week_and_month() {
        // 2025-03-10 is a Monday; the week started on Sunday the 9th.
        let mut this_week = view("Week", "discovery_realizada");
        this_week.lead.fecha_discovery =
            Some(Utc.with_ymd_and_hms(2025, 3, 9, 13, 0, 0).unwrap().fixed_offset());
        let mut last_week = view("Old", "discovery_realizada");
        last_week.lead.fecha_discovery =
            Some(Utc.with_ymd_and_hms(2025, 3, 8, 13, 0, 0).unwrap().fixed_offset());

        let mut won_now = view("Now", WON);
        won_now.lead.monto_propuesta = 800.0;
        won_now.lead.updated_at = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap().fixed_offset();
        let mut won_before = view("Before", WON);
        won_before.lead.monto_propuesta = 300.0;
        won_before.lead.updated_at = Utc.with_ymd_and_hms(2025, 2, 27, 12, 0, 0).unwrap().fixed_offset();

        let summary = summarize(&[this_week, last_week, won_now, won_before], &[], &[], now(), offset());
        assert_eq!(summary.meetings_this_week, 1);
        assert_eq!(summary.won_this_month, 1);
        assert!((summary.won_amount_this_month - 800.0).abs() < f64::EPSILON);
        assert_eq!(summary.won_count, 2);
    }

    #[test]
    fn kpi_progress_is_capped() {
        assert_eq!(kpi_progress(10, 20), 50);
        assert_eq!(kpi_progress(30, 20), 100);
        assert_eq!(kpi_progress(3, 0), 0);
        assert_eq!(kpi_progress(1, 3), 33);
    }
}
