use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info};

use scia_core::config::{AppConfig, DispatchPolicy};
use scia_core::error::Result;
use scia_core::event::EventBus;
use scia_core::traits::LlmClient;
use scia_core::types::{RunEvent, RunId};

use super::dispatch::Dispatcher;
use super::edge::{entry, Stage};
use super::node::{GraphNode, ModelCall};
use super::router::Router;
use super::state::RunState;
use super::synthesizer::Synthesizer;
use crate::specialist::Specialists;

/// Result of executing a single node.
#[derive(Debug, Clone)]
pub struct NodeResult {
    /// Which node was executed.
    pub node: &'static str,
    /// Execution time in milliseconds.
    pub elapsed_ms: u64,
}

/// Result of executing the whole graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: RunId,
    /// Final state, with every node's update applied.
    pub state: RunState,
    /// Per-node results in execution order.
    pub node_results: Vec<NodeResult>,
    /// `End`, or `Blocked` when the graph was never entered.
    pub final_stage: Stage,
    pub total_elapsed_ms: u64,
}

/// Walks the fixed graph: router, then dispatch, then synthesizer.
///
/// Built once per process; each [`execute`](Self::execute) call owns its
/// own state, so concurrent runs never share data.
pub struct GraphExecutor {
    router: Router,
    dispatcher: Dispatcher,
    synthesizer: Synthesizer,
    events: Arc<EventBus>,
}

impl GraphExecutor {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        config: &AppConfig,
        specialists: Specialists,
        events: Arc<EventBus>,
    ) -> Self {
        let model = ModelCall::new(
            llm,
            config.model.clone(),
            config.retry.clone(),
            events.clone(),
        );
        Self {
            router: Router::new(model.clone()),
            dispatcher: Dispatcher::new(
                specialists,
                config.orchestration.dispatch,
                config.orchestration.max_concurrency,
                config.retry.clone(),
                events.clone(),
            ),
            synthesizer: Synthesizer::new(model),
            events,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.dispatcher.policy()
    }

    fn node(&self, stage: Stage) -> Option<&dyn GraphNode> {
        match stage {
            Stage::Routing => Some(&self.router),
            Stage::Dispatching => Some(&self.dispatcher),
            Stage::Synthesizing => Some(&self.synthesizer),
            Stage::Start | Stage::End | Stage::Blocked => None,
        }
    }

    /// Run the graph to a terminal stage.
    ///
    /// A blocked state returns immediately without touching any node. Any
    /// node error aborts the run and is returned as is.
    pub async fn execute(&self, initial: RunState) -> Result<ExecutionResult> {
        let run_id = RunId::new();
        let start = Instant::now();
        let mut state = initial;
        let mut node_results = Vec::new();
        let mut stage = entry(&state);

        if stage == Stage::Blocked {
            debug!(run_id = %run_id, "Run blocked before routing");
            return Ok(ExecutionResult {
                run_id,
                state,
                node_results,
                final_stage: stage,
                total_elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }

        info!(run_id = %run_id, policy = %self.policy(), "Run started");
        self.events.publish(RunEvent::RunStarted {
            run_id: run_id.clone(),
        });

        while !stage.is_terminal() {
            let Some(node) = self.node(stage) else {
                stage = stage.next();
                continue;
            };

            let node_start = Instant::now();
            self.events.publish(RunEvent::NodeStarted {
                run_id: run_id.clone(),
                node: node.name().to_string(),
            });
            debug!(run_id = %run_id, node = node.name(), stage = %stage, "Executing graph node");

            let update = match node.run(&run_id, &state).await {
                Ok(update) => update,
                Err(e) => {
                    error!(run_id = %run_id, node = node.name(), error = %e, "Graph node failed");
                    self.events.publish(RunEvent::RunFailed {
                        run_id: run_id.clone(),
                        error: e.to_string(),
                    });
                    return Err(e);
                }
            };

            if let Some(ref units) = update.selected_units {
                self.events.publish(RunEvent::UnitsSelected {
                    run_id: run_id.clone(),
                    units: units.clone(),
                });
            }
            state.apply(update);

            let elapsed_ms = node_start.elapsed().as_millis() as u64;
            self.events.publish(RunEvent::NodeFinished {
                run_id: run_id.clone(),
                node: node.name().to_string(),
                elapsed_ms,
            });
            node_results.push(NodeResult {
                node: node.name(),
                elapsed_ms,
            });

            stage = stage.next();
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            run_id = %run_id,
            units = ?state.selected_units,
            total_elapsed_ms,
            "Run complete"
        );
        self.events.publish(RunEvent::RunComplete {
            run_id: run_id.clone(),
            elapsed_ms: total_elapsed_ms,
        });

        Ok(ExecutionResult {
            run_id,
            state,
            node_results,
            final_stage: stage,
            total_elapsed_ms,
        })
    }
}
