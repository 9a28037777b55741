//! Daily follow-up queue.

use std::cmp::Ordering;

use serde::Serialize;
use utoipa::ToSchema;

use super::derived::{LeadView, URGENT_AFTER_DAYS};
use super::stages;
use crate::models::lead::NivelInteres;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct FollowUpQueue {
    /// Pending leads not contacted in `URGENT_AFTER_DAYS` days, or never
    pub urgent: Vec<LeadView>,
    pub hot: Vec<LeadView>,
    pub warm: Vec<LeadView>,
    pub cold: Vec<LeadView>,
    pub completed_today: Vec<LeadView>,
    pub pending_count: usize,
    /// Rounded share of active leads already contacted today
    pub completion_pct: u8,
    /// Sum of estimated value over pending leads
    pub potential_total: f64,
}

fn needs_urgent_contact(view: &LeadView) -> bool {
    view.dias_sin_contacto.is_none_or(|days| days >= URGENT_AFTER_DAYS)
}

/// Most neglected first; never-contacted leads lead the list.
fn by_neglect(a: &LeadView, b: &LeadView) -> Ordering {
    let days = |v: &LeadView| v.dias_sin_contacto.unwrap_or(i64::MAX);
    days(b)
        .cmp(&days(a))
        .then_with(|| a.lead.business_name.cmp(&b.lead.business_name))
}

pub fn completion_pct(completed: usize, pending: usize) -> u8 {
    let total = completed + pending;
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u8
}

/// Builds the queue from derived views; `seguido_hoy` must already be rolled over.
pub fn build_queue(views: impl IntoIterator<Item = LeadView>) -> FollowUpQueue {
    let mut queue = FollowUpQueue::default();

    let active = views
        .into_iter()
        .filter(|v| v.lead.seguimiento_activo && !stages::is_terminal(&v.lead.estado_actual));

    for view in active {
        if view.lead.seguido_hoy {
            queue.completed_today.push(view);
            continue;
        }

        queue.pending_count += 1;
        queue.potential_total += view.lead.valor_estimado_usd;
        if needs_urgent_contact(&view) {
            queue.urgent.push(view.clone());
        }
        match view.lead.nivel_interes {
            NivelInteres::Caliente => queue.hot.push(view),
            NivelInteres::Tibio => queue.warm.push(view),
            NivelInteres::Frio => queue.cold.push(view),
        }
    }

    for bucket in [
        &mut queue.urgent,
        &mut queue.hot,
        &mut queue.warm,
        &mut queue.cold,
        &mut queue.completed_today,
    ] {
        bucket.sort_by(by_neglect);
    }

    queue.completion_pct = completion_pct(queue.completed_today.len(), queue.pending_count);
    queue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::view;

    fn contacted(name: &str, days: i64) -> LeadView {
        let mut v = view(name, "mensaje_enviado");
        v.dias_sin_contacto = Some(days);
        v
    }

    #[test]
    fn inactive_and_terminal_leads_are_excluded() {
        let mut paused = view("Pausado", "mensaje_enviado");
        paused.lead.seguimiento_activo = false;
        let won = view("Ganado", "ganado");
        let lost = view("Perdido", "perdido");

        let queue = build_queue([paused, won, lost]);
        assert_eq!(queue.pending_count, 0);
        assert!(queue.completed_today.is_empty());
        assert_eq!(queue.completion_pct, 0);
    }

    #[test]
    fn pending_leads_split_by_interest_and_urgency() {
        let mut hot = contacted("Caliente", 5);
        hot.lead.nivel_interes = NivelInteres::Caliente;
        let mut warm = contacted("Tibio", 1);
        warm.lead.nivel_interes = NivelInteres::Tibio;
        let never = view("Nuevo", "nuevo_lead");

        let queue = build_queue([hot, warm, never]);
        assert_eq!(queue.pending_count, 3);
        assert_eq!(queue.hot.len(), 1);
        assert_eq!(queue.warm.len(), 1);
        assert_eq!(queue.cold.len(), 1);

        let urgent: Vec<_> = queue.urgent.iter().map(|v| v.lead.business_name.as_str()).collect();
        assert_eq!(urgent, ["Nuevo", "Caliente"]);
    }

    #[test]
    fn completion_is_share_of_contacted_today() {
        let mut done = contacted("Hecho", 0);
        done.lead.seguido_hoy = true;
        let queue = build_queue([done, contacted("A", 1), contacted("B", 2)]);

        assert_eq!(queue.completed_today.len(), 1);
        assert_eq!(queue.pending_count, 2);
        assert_eq!(queue.completion_pct, 33);
        assert_eq!(completion_pct(0, 0), 0);
        assert_eq!(completion_pct(4, 0), 100);
    }

    #[test]
    fn buckets_sort_by_days_then_name() {
        let queue = build_queue([contacted("b", 2), contacted("a", 2), contacted("c", 6)]);
        let names: Vec<_> = queue.cold.iter().map(|v| v.lead.business_name.as_str()).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn potential_total_counts_pending_only() {
        let mut pending = contacted("P", 1);
        pending.lead.valor_estimado_usd = 500.0;
        let mut done = contacted("D", 0);
        done.lead.seguido_hoy = true;
        done.lead.valor_estimado_usd = 900.0;

        let queue = build_queue([pending, done]);
        assert!((queue.potential_total - 500.0).abs() < f64::EPSILON);
    }
}
