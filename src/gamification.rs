//! Sales gamification: XP, levels, badges and achievements.
//!
//! Everything is computed from the current leads and tasks; nothing is stored.

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{lead, task};
use crate::pipeline::derived::contacted_today;
use crate::pipeline::stages;

const XP_PER_LEAD: u32 = 10;
const XP_PER_CONTACTED_LEAD: u32 = 15;
const XP_PER_FOLLOW_UP: u32 = 5;
const XP_PER_DISCOVERY: u32 = 50;
const XP_PER_WIN: u32 = 200;
const XP_PER_COMPLETED_TASK: u32 = 20;
const HIGH_VALUE_USD: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Level {
    pub level: u8,
    pub title: &'static str,
    pub xp: u32,
    pub emoji: &'static str,
}

const fn level(level: u8, title: &'static str, xp: u32, emoji: &'static str) -> Level {
    Level {
        level,
        title,
        xp,
        emoji,
    }
}

pub const LEVELS: [Level; 10] = [
    level(1, "Novato", 0, "🌱"),
    level(2, "Aprendiz", 100, "📘"),
    level(3, "Prospector", 300, "🔍"),
    level(4, "Vendedor", 600, "💼"),
    level(5, "Estratega", 1000, "🎯"),
    level(6, "Experto", 1500, "🏆"),
    level(7, "Maestro", 2200, "👑"),
    level(8, "Leyenda", 3000, "⚡"),
    level(9, "Élite", 4000, "💎"),
    level(10, "Jefe Final", 5000, "🔱"),
];

/// Activity counters every other number here is computed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ActivityStats {
    pub leads_created: u32,
    /// Leads with at least one recorded follow-up
    pub leads_contacted: u32,
    pub follow_ups: u32,
    pub discoveries: u32,
    pub won: u32,
    pub tasks_completed: u32,
    pub contacted_today: u32,
    pub active_leads: u32,
    pub has_high_value_deal: bool,
}

impl ActivityStats {
    pub fn collect(leads: &[lead::Model], tasks: &[task::Model], today: NaiveDate) -> Self {
        let count = |pred: &dyn Fn(&lead::Model) -> bool| leads.iter().filter(|l| pred(l)).count() as u32;
        Self {
            leads_created: leads.len() as u32,
            leads_contacted: count(&|l| l.contador_seguimientos > 0),
            follow_ups: leads
                .iter()
                .map(|l| l.contador_seguimientos.max(0) as u32)
                .sum(),
            discoveries: count(&|l| l.fecha_discovery.is_some()),
            won: count(&|l| l.estado_actual == stages::WON),
            tasks_completed: tasks.iter().filter(|t| t.completed).count() as u32,
            contacted_today: count(&|l| contacted_today(l, today)),
            active_leads: count(&|l| !stages::is_terminal(&l.estado_actual)),
            has_high_value_deal: leads.iter().any(|l| l.valor_estimado_usd >= HIGH_VALUE_USD),
        }
    }

    pub fn total_xp(&self) -> u32 {
        self.leads_created * XP_PER_LEAD
            + self.leads_contacted * XP_PER_CONTACTED_LEAD
            + self.follow_ups * XP_PER_FOLLOW_UP
            + self.discoveries * XP_PER_DISCOVERY
            + self.won * XP_PER_WIN
            + self.tasks_completed * XP_PER_COMPLETED_TASK
    }

    /// Follow-ups per lead as a percentage, capped at 100.
    pub fn energy(&self) -> u8 {
        let ratio = f64::from(self.follow_ups) / f64::from(self.leads_created.max(1));
        (ratio * 100.0).round().min(100.0) as u8
    }
}

/// Highest level reached with `xp`.
pub fn current_level(xp: u32) -> Level {
    LEVELS
        .iter()
        .rev()
        .find(|l| xp >= l.xp)
        .copied()
        .unwrap_or(LEVELS[0])
}

/// The next level above `xp`, or the top level once reached.
pub fn next_level(xp: u32) -> Level {
    LEVELS
        .iter()
        .find(|l| l.xp > xp)
        .copied()
        .unwrap_or(LEVELS[LEVELS.len() - 1])
}

/// Progress from the current level toward the next, 0-100.
pub fn level_progress(xp: u32) -> u8 {
    let current = current_level(xp);
    let next = next_level(xp);
    if next.xp <= current.xp {
        return 100;
    }
    let pct = f64::from(xp - current.xp) / f64::from(next.xp - current.xp) * 100.0;
    pct.round().min(100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Badge {
    pub id: &'static str,
    pub emoji: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub unlocked: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Achievement {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub xp: u32,
    pub completed: bool,
}

pub fn badges(stats: &ActivityStats) -> Vec<Badge> {
    let level = current_level(stats.total_xp()).level;
    let badge = |id, emoji, name, description, unlocked| Badge {
        id,
        emoji,
        name,
        description,
        unlocked,
    };
    vec![
        badge("1", "🏁", "Primer Paso", "Crear tu primer lead", stats.leads_created >= 1),
        badge("2", "📞", "Primer Contacto", "Contactar un lead por WhatsApp", stats.leads_contacted >= 1),
        badge("3", "🔥", "En Llamas", "Contactar 5 leads en un día", stats.contacted_today >= 5),
        badge("4", "📚", "Coleccionista", "Tener 10+ leads en el pipeline", stats.leads_created >= 10),
        badge("5", "🔍", "Detective", "Completar tu primer discovery", stats.discoveries >= 1),
        badge("6", "🎯", "Sniper", "Cerrar tu primera venta", stats.won >= 1),
        badge("7", "💪", "Imparable", "Hacer 20+ follow-ups", stats.follow_ups >= 20),
        badge("8", "⚡", "Velocista", "Completar 10 tareas", stats.tasks_completed >= 10),
        badge("9", "🏆", "Campeón", "Ganar 3+ deals", stats.won >= 3),
        badge("10", "👑", "Rey del Pipe", "20+ leads activos simultáneos", stats.active_leads >= 20),
        badge("11", "💎", "Alto Valor", "Deal de $1000+ USD", stats.has_high_value_deal),
        badge("12", "🔱", "Élite Total", "Alcanzar nivel 5+", level >= 5),
    ]
}

pub fn achievements(stats: &ActivityStats) -> Vec<Achievement> {
    let achievement = |id, title, description, xp, completed| Achievement {
        id,
        title,
        description,
        xp,
        completed,
    };
    vec![
        achievement("1", "Pipeline Inicial", "Crear 5 leads", 50, stats.leads_created >= 5),
        achievement("2", "Máquina de Contacto", "Realizar 10 follow-ups", 100, stats.follow_ups >= 10),
        achievement("3", "Organizador", "Completar 5 tareas", 75, stats.tasks_completed >= 5),
        achievement("4", "Closer", "Cerrar tu primer deal", 200, stats.won >= 1),
        achievement("5", "Discovery Master", "Realizar 3 discoveries", 150, stats.discoveries >= 3),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GamificationProfile {
    pub total_xp: u32,
    pub level: Level,
    pub next_level: Level,
    pub xp_progress: u8,
    pub xp_to_next: u32,
    pub energy: u8,
    pub stats: ActivityStats,
    pub badges: Vec<Badge>,
    pub achievements: Vec<Achievement>,
}

pub fn profile(leads: &[lead::Model], tasks: &[task::Model], today: NaiveDate) -> GamificationProfile {
    let stats = ActivityStats::collect(leads, tasks, today);
    let total_xp = stats.total_xp();
    let next = next_level(total_xp);
    GamificationProfile {
        total_xp,
        level: current_level(total_xp),
        next_level: next,
        xp_progress: level_progress(total_xp),
        xp_to_next: next.xp.saturating_sub(total_xp),
        energy: stats.energy(),
        badges: badges(&stats),
        achievements: achievements(&stats),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::lead;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn xp_formula_weights_each_activity() {
        let mut contacted = lead("A", "contactado");
        contacted.contador_seguimientos = 2;
        let mut won = lead("B", stages::WON);
        won.fecha_discovery = Some(won.created_at);

        let stats = ActivityStats::collect(&[contacted, won], &[], today());
        // 2 leads, 1 contacted, 2 follow-ups, 1 discovery, 1 win
        assert_eq!(stats.total_xp(), 20 + 15 + 10 + 50 + 200);
    }

    #[test]
    fn levels_follow_thresholds() {
        assert_eq!(current_level(0).title, "Novato");
        assert_eq!(current_level(99).level, 1);
        assert_eq!(current_level(100).title, "Aprendiz");
        assert_eq!(current_level(5000).title, "Jefe Final");
        assert_eq!(next_level(250).title, "Prospector");
        assert_eq!(level_progress(200), 50);
        assert_eq!(level_progress(9999), 100);
    }

    #[test]
    fn energy_is_capped() {
        let stats = ActivityStats {
            leads_created: 2,
            follow_ups: 7,
            ..Default::default()
        };
        assert_eq!(stats.energy(), 100);

        let none = ActivityStats::default();
        assert_eq!(none.energy(), 0);
    }

    #[test]
    fn first_lead_unlocks_first_badge_only() {
        let stats = ActivityStats::collect(&[lead("A", "nuevo_lead")], &[], today());
        let unlocked: Vec<_> = badges(&stats)
            .into_iter()
            .filter(|b| b.unlocked)
            .map(|b| b.name)
            .collect();
        assert_eq!(unlocked, vec!["Primer Paso"]);
    }
}
