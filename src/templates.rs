//! Message template categories, default templates and placeholder rendering.
//!
//! Placeholders are written `{name}`. Known names are replaced from the lead
//! and the local clock; unknown ones are left as written.

use std::sync::OnceLock;

use chrono::{DateTime, FixedOffset};
use regex::{Captures, Regex};
use serde::Serialize;
use url::Url;
use utoipa::ToSchema;

use crate::models::lead;
use crate::models::message_template::TemplateType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct TemplateCategory {
    pub id: &'static str,
    pub label: &'static str,
}

pub const CATEGORIES: [TemplateCategory; 7] = [
    TemplateCategory { id: "presentacion", label: "👋 Presentación" },
    TemplateCategory { id: "followup", label: "📞 Follow-up" },
    TemplateCategory { id: "discovery", label: "🔍 Discovery" },
    TemplateCategory { id: "loom", label: "🎥 Loom" },
    TemplateCategory { id: "propuesta", label: "📋 Propuesta" },
    TemplateCategory { id: "cierre", label: "✅ Cierre" },
    TemplateCategory { id: "custom", label: "🔧 Custom" },
];

pub fn is_category(id: &str) -> bool {
    CATEGORIES.iter().any(|c| c.id == id)
}

pub struct DefaultTemplate {
    pub title: &'static str,
    pub category: &'static str,
    pub content: &'static str,
    pub template_type: TemplateType,
}

pub const DEFAULT_TEMPLATES: [DefaultTemplate; 6] = [
    DefaultTemplate {
        title: "Primer Contacto — Presentación",
        category: "presentacion",
        content: "Hola {nombre}! 👋\n\nSoy [Tu Nombre] de Adnexum. Me encontré con {empresa} y me llamó la atención lo que hacen en {rubro}.\n\nQuería consultar, ¿quién es la persona encargada de las decisiones comerciales o de marketing en la empresa?\n\nTengo una propuesta breve que podría generarles más ventas usando IA y automatización. ¿Te interesaría una llamada de 5 minutos para explicarte?\n\nQuedo atento! 🚀",
        template_type: TemplateType::Whatsapp,
    },
    DefaultTemplate {
        title: "Follow-up — Sin Respuesta",
        category: "followup",
        content: "Hola {nombre}! 👋\n\nTe escribí hace unos días por el tema de automatización para {empresa}. \n\nEntiendo que están ocupados, solo quería confirmar si siguen interesados en explorar cómo la IA podría ayudarlos a captar más clientes y ahorrar tiempo en procesos repetitivos.\n\n¿Les sirve una llamada breve esta semana? 📞\n\nSaludos!",
        template_type: TemplateType::Whatsapp,
    },
    DefaultTemplate {
        title: "Agendar Discovery Call",
        category: "discovery",
        content: "Perfecto {nombre}! 🙌\n\nTe voy a enviar un link para agendar la llamada de descubrimiento. Son 20-30 minutos donde vamos a:\n\n1️⃣ Entender cómo funciona hoy {empresa}\n2️⃣ Identificar dónde se pierden ventas o tiempo\n3️⃣ Ver qué se puede automatizar con IA\n\n📅 Link de agenda: [TU_LINK_CALENDLY]\n\nMientras tanto, te dejo un breve video donde muestro cómo funciona: [LINK_LOOM]\n\nNos vemos! 🚀",
        template_type: TemplateType::Whatsapp,
    },
    DefaultTemplate {
        title: "Pre-Discovery — Envío de Loom",
        category: "loom",
        content: "Hola {nombre}! 🎥\n\nComo te comenté, antes de nuestra llamada quería compartirte este video donde explico:\n\n🔍 El costo de oportunidad de seguir operando sin automatización\n🤖 Un agente de IA funcionando en vivo\n📊 Diferencia entre invertir en ads CON vs SIN sistema de ventas inteligente\n\n👉 Video: [LINK_LOOM]\n\nMiralo cuando puedas así aprovechamos al máximo nuestra llamada del {fecha}.\n\nCualquier duda me escribís! 💪",
        template_type: TemplateType::Whatsapp,
    },
    DefaultTemplate {
        title: "Pre-Propuesta — 24hs Antes",
        category: "propuesta",
        content: "Hola {nombre}! 📋\n\nMañana tenemos nuestra reunión de propuesta para {empresa}. Quería enviarte este video de preparación:\n\n🎯 Punto A: Donde está {empresa} hoy\n🚀 Punto B: Donde debería estar con automatización  \n💎 Punto C: El plan para llegar ahí\n\n👉 Video: [LINK_LOOM_PROPUESTA]\n\nAnalizamos a fondo tu negocio y hay oportunidades increíbles. Mañana te presento todo.\n\nNos vemos a las {hora}! 🔥",
        template_type: TemplateType::Whatsapp,
    },
    DefaultTemplate {
        title: "Post-Venta — Bienvenida",
        category: "cierre",
        content: "{nombre}!! 🎉🎉\n\nBienvenido al equipo! Estamos muy contentos de arrancar a trabajar con {empresa}.\n\nPróximos pasos:\n1️⃣ Te llega un email con el contrato y accesos\n2️⃣ Agendamos el kickoff en los próximos 2 días\n3️⃣ Arrancamos la auditoría de tu negocio\n\nCualquier cosa me escribís. Tu inversión va a dar resultados increíbles! 🚀💪\n\nAbrazo grande!",
        template_type: TemplateType::Whatsapp,
    },
];

fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("placeholder pattern is valid"))
}

/// Placeholder names in order of first appearance.
pub fn variables(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder().captures_iter(content) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn or_marker(value: Option<&str>, marker: &str) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| marker.to_string())
}

/// Fills `content` for `lead` at local time `now`.
pub fn render(content: &str, lead: &lead::Model, now: DateTime<FixedOffset>) -> String {
    placeholder()
        .replace_all(content, |caps: &Captures| match &caps[1] {
            "nombre" => lead.display_contact_name().to_string(),
            "empresa" => lead.business_name.clone(),
            "rubro" => or_marker(lead.rubro.as_deref(), "[rubro]"),
            "ciudad" => or_marker(lead.ciudad.as_deref(), "[ciudad]"),
            "fecha" => now.format("%d/%m/%Y").to_string(),
            "hora" => now.format("%H:%M").to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

/// `wa.me` link that opens a chat with the lead prefilled with `text`.
pub fn whatsapp_link(lead: &lead::Model, text: &str) -> Option<String> {
    let digits: String = lead
        .contact_phone()?
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    let mut url = Url::parse(&format!("https://wa.me/{}", digits)).ok()?;
    url.query_pairs_mut().append_pair("text", text);
    Some(url.into())
}
