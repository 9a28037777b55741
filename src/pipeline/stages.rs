//! The fixed, ordered catalog of pipeline stages.

use serde::Serialize;
use utoipa::ToSchema;

/// A pipeline stage with its display metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Stage {
    pub id: &'static str,
    pub label: &'static str,
    pub emoji: &'static str,
    pub color: &'static str,
    pub order: u8,
}

pub const WON: &str = "ganado";
pub const LOST: &str = "perdido";

const fn stage(
    id: &'static str,
    label: &'static str,
    emoji: &'static str,
    color: &'static str,
    order: u8,
) -> Stage {
    Stage {
        id,
        label,
        emoji,
        color,
        order,
    }
}

pub const STAGES: [Stage; 13] = [
    stage("nuevo_lead", "Nuevo Lead", "🆕", "#6366f1", 0),
    stage("mensaje_enviado", "Mensaje Enviado", "📤", "#8b5cf6", 1),
    stage("respuesta_recibida", "Respuesta Recibida", "📥", "#a78bfa", 2),
    stage("micro_discovery", "Micro Discovery", "🔍", "#c084fc", 3),
    stage("discovery_agendar", "Agendar Discovery", "📅", "#e879f9", 4),
    stage("discovery_agendada", "Discovery Agendada", "✅", "#f472b6", 5),
    stage("discovery_realizada", "Discovery Realizada", "🎯", "#fb7185", 6),
    stage("loom_enviado", "Loom Enviado", "🎥", "#f97316", 7),
    stage("venta_agendada", "Venta Agendada", "💰", "#eab308", 8),
    stage("venta_realizada", "Venta Realizada", "🤝", "#84cc16", 9),
    stage("follow_up", "Follow Up", "🔄", "#22c55e", 10),
    stage(WON, "Ganado", "🏆", "#10b981", 11),
    stage(LOST, "Perdido", "❌", "#ef4444", 12),
];

/// All stages in display order.
pub fn catalog() -> &'static [Stage] {
    &STAGES
}

pub fn find(id: &str) -> Option<&'static Stage> {
    STAGES.iter().find(|stage| stage.id == id)
}

pub fn is_known(id: &str) -> bool {
    find(id).is_some()
}

/// Stage assigned to newly created leads.
pub fn first_stage() -> &'static Stage {
    &STAGES[0]
}

/// Won and lost leads leave the active pipeline.
pub fn is_terminal(id: &str) -> bool {
    id == WON || id == LOST
}

/// Stages shown in progress displays.
pub fn progress_stages() -> impl Iterator<Item = &'static Stage> {
    STAGES.iter().filter(|stage| !is_terminal(stage.id))
}

/// Suggested checklist for a lead sitting in `stage`.
pub fn stage_tasks(stage: &str) -> &'static [&'static str] {
    match stage {
        "nuevo_lead" => &[
            "Investigar negocio online",
            "Buscar número de WhatsApp del dueño",
            "Preparar mensaje de presentación",
        ],
        "mensaje_enviado" => &[
            "Esperar respuesta 24-48h",
            "Preparar follow-up si no responde",
            "Investigar redes sociales",
        ],
        "respuesta_recibida" => &[
            "Analizar nivel de interés",
            "Preparar pitch breve de 5 min",
            "Confirmar si habla el dueño",
        ],
        "micro_discovery" => &[
            "Recopilar info básica del negocio",
            "Identificar dolores principales",
            "Evaluar potencial de venta",
        ],
        "discovery_agendar" => &[
            "Enviar opciones de horario",
            "Confirmar disponibilidad",
            "Preparar calendario",
        ],
        "discovery_agendada" => &[
            "Grabar Loom explicativo previo",
            "Preparar preguntas de discovery",
            "Revisar info del negocio",
        ],
        "discovery_realizada" => &[
            "Procesar notas de la llamada",
            "Identificar dolores y oportunidades",
            "Armar propuesta personalizada",
        ],
        "loom_enviado" => &[
            "Follow-up 24h después del Loom",
            "Preparar recap de dolores",
            "Preparar presentación de propuesta",
        ],
        "venta_agendada" => &[
            "Enviar video 24h antes con punto A-B-C",
            "Preparar presentación de fases + ROI",
            "Tener CBU listo",
            "Cargar celular",
            "Revisar guión personalizado",
        ],
        "venta_realizada" => &[
            "Enviar recap por email",
            "Agendar kickoff si cerró",
            "Registrar objeciones si no cerró",
        ],
        "follow_up" => &[
            "Contactar según intervalo configurado",
            "Evaluar si sigue interesado",
            "Actualizar nivel de interés",
        ],
        WON => &[
            "🎉 Celebrar cierre",
            "Iniciar onboarding",
            "Agendar kickoff del proyecto",
        ],
        LOST => &[
            "Registrar motivo de pérdida",
            "Agendar follow-up futuro (30-60 días)",
            "Aprender de la experiencia",
        ],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_ordered_and_unique() {
        for (index, stage) in catalog().iter().enumerate() {
            assert_eq!(stage.order as usize, index);
            assert_eq!(catalog().iter().filter(|s| s.id == stage.id).count(), 1);
        }
        assert_eq!(first_stage().id, "nuevo_lead");
    }

    #[test]
    fn terminal_stages_are_known_but_not_in_progress() {
        assert!(is_known(WON) && is_known(LOST));
        assert!(progress_stages().all(|stage| !is_terminal(stage.id)));
        assert_eq!(progress_stages().count(), STAGES.len() - 2);
    }

    #[test]
    fn every_stage_has_a_checklist() {
        for stage in catalog() {
            assert!(!stage_tasks(stage.id).is_empty(), "{} has no tasks", stage.id);
        }
        assert!(stage_tasks("archivado").is_empty());
    }
}
