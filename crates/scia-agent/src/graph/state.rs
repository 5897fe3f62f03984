use std::collections::BTreeMap;

use scia_core::types::{ChatMessage, UnitId};

/// Shared state threaded through one run of the graph.
///
/// Created fresh per query and dropped once the report has been extracted.
/// Nodes never mutate it directly; they return a [`StateUpdate`] that the
/// executor applies with the per-field merge rules.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    /// Append-only conversation.
    pub turns: Vec<ChatMessage>,
    /// Units chosen by the router, in selection order.
    pub selected_units: Vec<UnitId>,
    /// One output per unit that has run.
    pub unit_outputs: BTreeMap<UnitId, String>,
    /// Written once by the synthesizer; empty until then.
    pub final_report: String,
    /// Set when the input guardrail rejected the query.
    pub blocked: bool,
}

impl RunState {
    /// State for a new query: a single user turn.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            turns: vec![ChatMessage::user(query)],
            ..Self::default()
        }
    }

    /// State for a query the input guardrail refused.
    pub fn blocked(query: impl Into<String>) -> Self {
        Self {
            blocked: true,
            ..Self::new(query)
        }
    }

    /// Most recent turn, if any.
    pub fn last_turn(&self) -> Option<&ChatMessage> {
        self.turns.last()
    }

    /// Text of the first turn (the original query).
    pub fn original_query(&self) -> String {
        self.turns.first().map(|t| t.text()).unwrap_or_default()
    }

    /// Apply a node's partial update.
    ///
    /// - `turns`: appended in arrival order
    /// - `selected_units`: replaced wholesale when present
    /// - `unit_outputs`: key-wise union, later writer wins per key
    /// - `final_report`: replaced when present
    pub fn apply(&mut self, update: StateUpdate) {
        self.turns.extend(update.turns);
        if let Some(units) = update.selected_units {
            self.selected_units = units;
        }
        self.unit_outputs.extend(update.unit_outputs);
        if let Some(report) = update.final_report {
            self.final_report = report;
        }
    }
}

/// Partial write produced by one node (or one dispatched unit).
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub turns: Vec<ChatMessage>,
    pub selected_units: Option<Vec<UnitId>>,
    pub unit_outputs: BTreeMap<UnitId, String>,
    pub final_report: Option<String>,
}

impl StateUpdate {
    pub fn selection(units: Vec<UnitId>) -> Self {
        Self {
            selected_units: Some(units),
            ..Self::default()
        }
    }

    pub fn unit_output(unit: UnitId, output: impl Into<String>) -> Self {
        let mut unit_outputs = BTreeMap::new();
        unit_outputs.insert(unit, output.into());
        Self {
            unit_outputs,
            ..Self::default()
        }
    }

    pub fn report(report: impl Into<String>) -> Self {
        Self {
            final_report: Some(report.into()),
            ..Self::default()
        }
    }

    /// Fold another update into this one with the same rules as [`RunState::apply`].
    pub fn merge(&mut self, other: StateUpdate) {
        self.turns.extend(other.turns);
        if other.selected_units.is_some() {
            self.selected_units = other.selected_units;
        }
        self.unit_outputs.extend(other.unit_outputs);
        if other.final_report.is_some() {
            self.final_report = other.final_report;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
            && self.selected_units.is_none()
            && self.unit_outputs.is_empty()
            && self.final_report.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_has_one_user_turn() {
        let state = RunState::new("Which suppliers are slow?");
        assert_eq!(state.turns.len(), 1);
        assert_eq!(state.original_query(), "Which suppliers are slow?");
        assert!(state.final_report.is_empty());
        assert!(!state.blocked);
        assert!(RunState::blocked("x").blocked);
    }

    #[test]
    fn selection_is_overwritten() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate::selection(vec![UnitId::DemandAnalyst]));
        state.apply(StateUpdate::selection(vec![UnitId::SupplierAnalyst]));
        assert_eq!(state.selected_units, vec![UnitId::SupplierAnalyst]);
    }

    #[test]
    fn turns_append_with_duplicates() {
        let mut state = RunState::new("q");
        let update = StateUpdate {
            turns: vec![ChatMessage::assistant_text("a"), ChatMessage::assistant_text("a")],
            ..StateUpdate::default()
        };
        state.apply(update);
        assert_eq!(state.turns.len(), 3);
        assert_eq!(state.last_turn().unwrap().text(), "a");
    }

    #[test]
    fn outputs_merge_independent_of_order() {
        let updates = || {
            vec![
                StateUpdate::unit_output(UnitId::DemandAnalyst, "A"),
                StateUpdate::unit_output(UnitId::InventoryMonitor, "B"),
                StateUpdate::unit_output(UnitId::SupplierAnalyst, "C"),
            ]
        };
        let orders: [[usize; 3]; 6] = [
            [0, 1, 2],
            [0, 2, 1],
            [1, 0, 2],
            [1, 2, 0],
            [2, 0, 1],
            [2, 1, 0],
        ];

        let mut results = Vec::new();
        for order in orders {
            let mut pending: Vec<Option<StateUpdate>> = updates().into_iter().map(Some).collect();
            let mut state = RunState::new("q");
            for i in order {
                if let Some(update) = pending[i].take() {
                    state.apply(update);
                }
            }
            results.push(state.unit_outputs);
        }

        let expected: BTreeMap<UnitId, String> = [
            (UnitId::DemandAnalyst, "A".to_string()),
            (UnitId::InventoryMonitor, "B".to_string()),
            (UnitId::SupplierAnalyst, "C".to_string()),
        ]
        .into_iter()
        .collect();
        assert!(results.iter().all(|r| *r == expected));
    }

    #[test]
    fn same_key_last_writer_wins() {
        let mut update = StateUpdate::unit_output(UnitId::DemandAnalyst, "first");
        update.merge(StateUpdate::unit_output(UnitId::DemandAnalyst, "second"));
        assert_eq!(update.unit_outputs[&UnitId::DemandAnalyst], "second");
        assert!(!update.is_empty());
        assert!(StateUpdate::default().is_empty());
    }

    #[test]
    fn report_written() {
        let mut state = RunState::new("q");
        state.apply(StateUpdate::report("## Summary"));
        assert_eq!(state.final_report, "## Summary");
    }
}
