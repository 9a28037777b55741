//! Fields computed from a stored lead at read time.
//!
//! Nothing here writes; deriving twice from the same snapshot and clock
//! yields the same view.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::lead;

pub const URGENT_AFTER_DAYS: i64 = 3;
pub const CRITICAL_AFTER_DAYS: i64 = 7;

/// Whole days since the last recorded interaction, `None` when the lead was never contacted.
///
/// A timestamp in the future counts as contacted today.
pub fn days_since_contact(lead: &lead::Model, now: DateTime<Utc>) -> Option<i64> {
    lead.fecha_ultima_interaccion.map(|last| {
        now.signed_duration_since(last.with_timezone(&Utc))
            .num_days()
            .max(0)
    })
}

/// Never-contacted leads are overdue.
pub fn is_urgent(days: Option<i64>) -> bool {
    days.is_none_or(|d| d >= URGENT_AFTER_DAYS)
}

pub fn is_critical(days: Option<i64>) -> bool {
    days.is_none_or(|d| d >= CRITICAL_AFTER_DAYS)
}

/// `seguido_hoy` only holds on the local date it was set.
pub fn contacted_today(lead: &lead::Model, today: NaiveDate) -> bool {
    lead.seguido_hoy && lead.seguido_hoy_fecha == Some(today)
}

pub fn local_today(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// A lead as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LeadView {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub lead: lead::Model,
    pub dias_sin_contacto: Option<i64>,
    pub is_urgent: bool,
    pub is_critical: bool,
}

impl LeadView {
    pub fn id(&self) -> uuid::Uuid {
        self.lead.id
    }
}

/// Builds the view, rolling `seguido_hoy` over when it was set on an earlier day.
pub fn derive(lead: &lead::Model, now: DateTime<Utc>, offset: FixedOffset) -> LeadView {
    let today = local_today(now, offset);
    let days = days_since_contact(lead, now);
    let mut lead = lead.clone();
    lead.seguido_hoy = contacted_today(&lead, today);

    LeadView {
        lead,
        dias_sin_contacto: days,
        is_urgent: is_urgent(days),
        is_critical: is_critical(days),
    }
}

pub fn derive_all(
    leads: impl IntoIterator<Item = lead::Model>,
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<LeadView> {
    leads
        .into_iter()
        .map(|lead| derive(&lead, now, offset))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::lead;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap()
    }

    fn offset() -> FixedOffset {
        FixedOffset::west_opt(3 * 3600).unwrap()
    }

    #[test]
    fn never_contacted_is_none_and_overdue() {
        let l = lead("Panadería Sol", "nuevo_lead");
        let days = days_since_contact(&l, now());
        assert_eq!(days, None);
        assert!(is_urgent(days));
        assert!(is_critical(days));
    }

    #[test]
    fn days_are_floored_and_never_negative() {
        let mut l = lead("Ferretería", "nuevo_lead");
        l.fecha_ultima_interaccion = Some((now() - Duration::hours(71)).fixed_offset());
        assert_eq!(days_since_contact(&l, now()), Some(2));

        l.fecha_ultima_interaccion = Some((now() - Duration::hours(72)).fixed_offset());
        let days = days_since_contact(&l, now());
        assert_eq!(days, Some(3));
        assert!(is_urgent(days));
        assert!(!is_critical(days));

        l.fecha_ultima_interaccion = Some((now() + Duration::days(2)).fixed_offset());
        assert_eq!(days_since_contact(&l, now()), Some(0));
    }

    #[test]
    fn contacted_flag_rolls_over_at_local_midnight() {
        let mut l = lead("Kiosco", "mensaje_enviado");
        l.seguido_hoy = true;
        l.seguido_hoy_fecha = Some(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap());

        assert!(derive(&l, now(), offset()).lead.seguido_hoy);

        // 02:00 UTC on the 11th is still the 10th in UTC-3.
        let late = Utc.with_ymd_and_hms(2025, 3, 11, 2, 0, 0).unwrap();
        assert!(derive(&l, late, offset()).lead.seguido_hoy);

        let next_day = Utc.with_ymd_and_hms(2025, 3, 11, 4, 0, 0).unwrap();
        assert!(!derive(&l, next_day, offset()).lead.seguido_hoy);
    }

    #[test]
    fn derive_is_idempotent() {
        let mut l = lead("Taller", "follow_up");
        l.fecha_ultima_interaccion = Some((now() - Duration::days(9)).fixed_offset());
        l.seguido_hoy = true;
        l.seguido_hoy_fecha = Some(NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());

        let first = derive(&l, now(), offset());
        let second = derive(&first.lead, now(), offset());
        assert_eq!(first, second);
        assert_eq!(first.dias_sin_contacto, Some(9));
        assert!(first.is_critical);
    }

    #[test]
    fn view_serializes_flat() {
        let view = derive(&lead("Óptica", "nuevo_lead"), now(), offset());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["business_name"], "Óptica");
        assert!(json["dias_sin_contacto"].is_null());
        assert_eq!(json["is_urgent"], true);
    }
}
