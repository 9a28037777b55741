//! Kanban grouping of leads by stage, with optimistic moves.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::derived::LeadView;
use super::stages::Stage;
use crate::models::lead::NivelInteres;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StageColumn {
    pub stage: Stage,
    pub leads: Vec<LeadView>,
    pub count: usize,
    /// Sum of `valor_estimado_usd` over the column
    pub total_value: f64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupedLeads {
    pub columns: Vec<StageColumn>,
    /// Leads whose stage is not in the catalog
    pub unassigned: Vec<LeadView>,
}

impl GroupedLeads {
    pub fn column(&self, stage_id: &str) -> Option<&StageColumn> {
        self.columns.iter().find(|column| column.stage.id == stage_id)
    }

    pub fn lead_count(&self) -> usize {
        self.columns.iter().map(|c| c.count).sum::<usize>() + self.unassigned.len()
    }
}

/// Groups leads into one column per catalog stage, preserving input order within a column.
pub fn group_by_stage(leads: impl IntoIterator<Item = LeadView>, catalog: &[Stage]) -> GroupedLeads {
    let mut columns: Vec<StageColumn> = catalog
        .iter()
        .map(|stage| StageColumn {
            stage: *stage,
            leads: Vec::new(),
            count: 0,
            total_value: 0.0,
        })
        .collect();
    let index: HashMap<&str, usize> = catalog
        .iter()
        .enumerate()
        .map(|(i, stage)| (stage.id, i))
        .collect();

    let mut unassigned = Vec::new();
    for lead in leads {
        match index.get(lead.lead.estado_actual.as_str()) {
            Some(&i) => {
                let column = &mut columns[i];
                column.total_value += lead.lead.valor_estimado_usd;
                column.count += 1;
                column.leads.push(lead);
            }
            None => unassigned.push(lead),
        }
    }

    GroupedLeads {
        columns,
        unassigned,
    }
}

/// Search and interest filter applied before grouping.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BoardFilter {
    /// Case-insensitive match on business name, owner, industry or city
    pub search: Option<String>,
    pub interes: Option<NivelInteres>,
}

impl BoardFilter {
    pub fn matches(&self, view: &LeadView) -> bool {
        let lead = &view.lead;
        let interest_ok = self.interes.is_none_or(|wanted| lead.nivel_interes == wanted);
        let needle = match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => needle.to_lowercase(),
            _ => return interest_ok,
        };

        let haystacks = [
            Some(lead.business_name.as_str()),
            lead.owner_name.as_deref(),
            lead.rubro.as_deref(),
            lead.ciudad.as_deref(),
        ];
        interest_ok
            && haystacks
                .into_iter()
                .flatten()
                .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// A move applied locally but not yet confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    pub lead_id: Uuid,
    pub from: String,
    pub to: String,
}

/// Client-side board state: leads keyed by id, in arrival order.
#[derive(Debug, Default)]
pub struct PipelineBoard {
    order: Vec<Uuid>,
    leads: HashMap<Uuid, LeadView>,
}

impl PipelineBoard {
    pub fn new(leads: impl IntoIterator<Item = LeadView>) -> Self {
        let mut board = Self::default();
        for lead in leads {
            board.upsert(lead);
        }
        board
    }

    pub fn upsert(&mut self, lead: LeadView) {
        let id = lead.id();
        if self.leads.insert(id, lead).is_none() {
            self.order.push(id);
        }
    }

    pub fn remove(&mut self, id: Uuid) -> Option<LeadView> {
        let removed = self.leads.remove(&id);
        if removed.is_some() {
            self.order.retain(|existing| *existing != id);
        }
        removed
    }

    pub fn get(&self, id: Uuid) -> Option<&LeadView> {
        self.leads.get(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Applies a drop locally. Dropping onto the current column is not a move.
    pub fn begin_move(&mut self, id: Uuid, target: &str) -> Option<PendingMove> {
        let lead = self.leads.get_mut(&id)?;
        if lead.lead.estado_actual == target {
            return None;
        }
        let from = std::mem::replace(&mut lead.lead.estado_actual, target.to_string());
        Some(PendingMove {
            lead_id: id,
            from,
            to: target.to_string(),
        })
    }

    /// Accepts the authoritative lead returned by the store.
    pub fn confirm(&mut self, pending: PendingMove, stored: Option<LeadView>) {
        match stored {
            Some(lead) => self.upsert(lead),
            None => tracing::debug!(lead_id = %pending.lead_id, to = %pending.to, "Move confirmed"),
        }
    }

    /// Restores the previous stage after a failed store call, unless a newer
    /// change already moved the lead elsewhere.
    pub fn revert(&mut self, pending: PendingMove) {
        if let Some(lead) = self.leads.get_mut(&pending.lead_id) {
            if lead.lead.estado_actual == pending.to {
                lead.lead.estado_actual = pending.from;
            }
        }
    }

    pub fn columns(&self, catalog: &[Stage]) -> GroupedLeads {
        group_by_stage(
            self.order.iter().filter_map(|id| self.leads.get(id).cloned()),
            catalog,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::view;
    use crate::pipeline::stages::catalog;

    #[test]
    fn grouping_neither_duplicates_nor_omits() {
        let leads = vec![
            view("A", "nuevo_lead"),
            view("B", "ganado"),
            view("C", "nuevo_lead"),
            view("D", "archivado"),
        ];
        let grouped = group_by_stage(leads.clone(), catalog());

        assert_eq!(grouped.columns.len(), catalog().len());
        assert_eq!(grouped.lead_count(), leads.len());
        let first = grouped.column("nuevo_lead").unwrap();
        let names: Vec<_> = first.leads.iter().map(|l| l.lead.business_name.as_str()).collect();
        assert_eq!(names, ["A", "C"]);
        assert_eq!(grouped.unassigned.len(), 1);
        for column in &grouped.columns {
            assert!(column.leads.iter().all(|l| l.lead.estado_actual == column.stage.id));
        }
    }

    #[test]
    fn column_totals_sum_estimated_value() {
        let mut a = view("A", "loom_enviado");
        a.lead.valor_estimado_usd = 1200.0;
        let mut b = view("B", "loom_enviado");
        b.lead.valor_estimado_usd = 300.5;

        let grouped = group_by_stage([a, b], catalog());
        let column = grouped.column("loom_enviado").unwrap();
        assert_eq!(column.count, 2);
        assert!((column.total_value - 1500.5).abs() < f64::EPSILON);
    }

    #[test]
    fn same_column_drop_is_not_a_move() {
        let lead = view("A", "nuevo_lead");
        let id = lead.id();
        let mut board = PipelineBoard::new([lead]);
        assert_eq!(board.begin_move(id, "nuevo_lead"), None);
    }

    #[test]
    fn failed_move_reverts_to_previous_stage() {
        let lead = view("A", "nuevo_lead");
        let id = lead.id();
        let mut board = PipelineBoard::new([lead]);

        let pending = board.begin_move(id, "mensaje_enviado").unwrap();
        assert_eq!(board.get(id).unwrap().lead.estado_actual, "mensaje_enviado");
        assert_eq!(pending.from, "nuevo_lead");

        board.revert(pending);
        assert_eq!(board.get(id).unwrap().lead.estado_actual, "nuevo_lead");
    }

    #[test]
    fn confirmed_move_keeps_target_stage() {
        let lead = view("A", "nuevo_lead");
        let id = lead.id();
        let mut board = PipelineBoard::new([lead]);

        let pending = board.begin_move(id, "ganado").unwrap();
        board.confirm(pending, None);
        let grouped = board.columns(catalog());
        assert_eq!(grouped.column("ganado").unwrap().count, 1);
        assert_eq!(grouped.column("nuevo_lead").unwrap().count, 0);
    }

    #[test]
    fn filter_matches_search_and_interest() {
        let mut lead = view("Panadería Sol", "nuevo_lead");
        lead.lead.ciudad = Some("Rosario".into());
        lead.lead.nivel_interes = NivelInteres::Caliente;

        let by_city = BoardFilter {
            search: Some("rosa".into()),
            interes: None,
        };
        assert!(by_city.matches(&lead));

        let wrong_interest = BoardFilter {
            search: None,
            interes: Some(NivelInteres::Frio),
        };
        assert!(!wrong_interest.matches(&lead));
        assert!(BoardFilter::default().matches(&lead));
    }
}
