use std::collections::BTreeMap;

use futures::future::BoxFuture;
use tracing::{info, warn};

use scia_core::error::Result;
use scia_core::types::{ChatMessage, RunId, UnitId};

use super::node::{GraphNode, ModelCall};
use super::state::{RunState, StateUpdate};

pub const SYNTHESIS_PROMPT: &str = "You are a supply chain coordinator. Synthesize the following \
specialist agent reports into a single, coherent executive summary. Highlight key findings, \
risks, and recommended actions. Use markdown formatting.";

/// One `## <Heading> Report` section per unit, in map order.
pub fn report_sections(outputs: &BTreeMap<UnitId, String>) -> String {
    outputs
        .iter()
        .map(|(unit, output)| format!("## {} Report\n{}", unit.heading(), output))
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn synthesis_messages(query: &str, outputs: &BTreeMap<UnitId, String>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYNTHESIS_PROMPT),
        ChatMessage::user(format!(
            "Original query: {}\n\nAgent Reports:\n{}",
            query,
            report_sections(outputs)
        )),
    ]
}

/// Synthesizer node. Returns the model's text untouched; sanitizing is the
/// pipeline's job.
pub struct Synthesizer {
    model: ModelCall,
}

impl Synthesizer {
    pub fn new(model: ModelCall) -> Self {
        Self { model }
    }

    pub async fn synthesize(
        &self,
        query: &str,
        outputs: &BTreeMap<UnitId, String>,
    ) -> Result<String> {
        let report = self.model.complete(synthesis_messages(query, outputs)).await?;
        if report.trim().is_empty() {
            warn!("Synthesizer returned an empty report");
        }
        info!(sections = outputs.len(), chars = report.len(), "Synthesized report");
        Ok(report)
    }
}

impl GraphNode for Synthesizer {
    fn name(&self) -> &'static str {
        "synthesizer"
    }

    fn run<'a>(
        &'a self,
        _run_id: &'a RunId,
        state: &'a RunState,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let report = self
                .synthesize(&state.original_query(), &state.unit_outputs)
                .await?;
            Ok(StateUpdate::report(report))
        })
    }
}
