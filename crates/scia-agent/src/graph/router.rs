use futures::future::BoxFuture;
use tracing::{info, warn};

use scia_core::error::Result;
use scia_core::types::{ChatMessage, RunId, UnitId};

use super::node::{GraphNode, ModelCall};
use super::state::{RunState, StateUpdate};

/// System instruction for the routing call. Lists every unit with its
/// responsibility, then asks for a bare comma-separated answer.
pub fn router_prompt() -> String {
    let units = UnitId::ALL
        .iter()
        .map(|u| format!("- {}: {}", u.as_str(), u.responsibility()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a supply chain coordinator. Given the user's query, decide which \
         specialist agents to invoke.\n\n\
         Available agents:\n{}\n\n\
         Respond with ONLY a comma-separated list of agent names to invoke (no explanation).\n\
         For broad queries, invoke all relevant agents. Examples:\n\
         - \"What products are at risk?\" -> inventory_monitor\n\
         - \"Analyze demand for P001\" -> demand_analyst\n\
         - \"Full supply chain report\" -> demand_analyst,inventory_monitor,supplier_analyst\n\
         - \"How are our suppliers doing?\" -> supplier_analyst",
        units
    )
}

/// Turn the router's raw reply into an ordered, duplicate-free unit selection.
///
/// Tokens are split on commas, trimmed (whitespace, quotes, backticks, a
/// trailing period) and matched case-insensitively. Unknown tokens are
/// dropped. If nothing valid remains, every unit is selected.
pub fn parse_selection(raw: &str) -> Vec<UnitId> {
    let mut selected = Vec::new();
    for token in raw.split(',') {
        let token = token.trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.'));
        if let Ok(unit) = token.parse::<UnitId>() {
            if !selected.contains(&unit) {
                selected.push(unit);
            }
        }
    }

    if selected.is_empty() {
        warn!(raw = %raw, "Router reply named no known unit, selecting all");
        return UnitId::ALL.to_vec();
    }
    selected
}

/// Router node: one model call over the latest turn, then [`parse_selection`].
pub struct Router {
    model: ModelCall,
}

impl Router {
    pub fn new(model: ModelCall) -> Self {
        Self { model }
    }

    pub async fn route(&self, last_turn: &ChatMessage) -> Result<Vec<UnitId>> {
        let messages = vec![ChatMessage::system(router_prompt()), last_turn.clone()];
        let raw = self.model.complete(messages).await?;
        let selected = parse_selection(&raw);
        info!(units = ?selected, "Routed query");
        Ok(selected)
    }
}

impl GraphNode for Router {
    fn name(&self) -> &'static str {
        "router"
    }

    fn run<'a>(
        &'a self,
        _run_id: &'a RunId,
        state: &'a RunState,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let selected = match state.last_turn() {
                Some(turn) => self.route(turn).await?,
                None => {
                    warn!("Run has no turns to route, selecting all units");
                    UnitId::ALL.to_vec()
                }
            };
            Ok(StateUpdate::selection(selected))
        })
    }
}
