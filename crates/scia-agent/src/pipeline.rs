use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use scia_core::config::AppConfig;
use scia_core::error::{Result, SciaError};
use scia_core::event::EventBus;
use scia_core::guardrail::Guardrails;
use scia_core::traits::LlmClient;
use scia_core::types::{RunEvent, UnitId};
use scia_llm::{apply_preset, create_client};

use crate::graph::{GraphExecutor, RunState};
use crate::specialist::Specialists;

/// What a caller gets back for one query.
#[derive(Debug, Clone)]
pub enum Answer {
    /// The input guardrail refused the query; no model was called.
    Rejected { reason: String },
    /// A sanitized report, with the intermediate results that produced it.
    Report {
        report: String,
        selected_units: Vec<UnitId>,
        unit_outputs: BTreeMap<UnitId, String>,
        elapsed_ms: u64,
    },
}

impl Answer {
    /// The text to show the user either way.
    pub fn text(&self) -> &str {
        match self {
            Answer::Rejected { reason } => reason,
            Answer::Report { report, .. } => report,
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Answer::Rejected { .. })
    }
}

/// Query in, report out: input guardrail, graph run, output guardrail.
pub struct Pipeline {
    executor: GraphExecutor,
    guardrails: &'static Guardrails,
    events: Arc<EventBus>,
    run_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(executor: GraphExecutor, events: Arc<EventBus>) -> Self {
        Self {
            executor,
            guardrails: Guardrails::shared(),
            events,
            run_timeout: None,
        }
    }

    /// Bound each run; an overrun fails with [`SciaError::RunTimeout`].
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    /// Build the full pipeline from configuration: provider client, dataset,
    /// tool subsets, model-backed units.
    pub fn from_config(config: &AppConfig, events: Arc<EventBus>) -> Result<Self> {
        config.validate()?;
        let mut config = config.clone();
        config.model = apply_preset(&config.model);

        let llm: Arc<dyn LlmClient> = Arc::from(create_client(&config.model));
        let specialists = Specialists::from_config(&config, llm.clone(), events.clone())?;
        let executor = GraphExecutor::new(llm, &config, specialists, events.clone());

        info!(
            provider = %config.model.provider,
            model = %config.model.model_id,
            dispatch = %config.orchestration.dispatch,
            "Pipeline ready"
        );

        Ok(Self::new(executor, events)
            .with_run_timeout(config.orchestration.run_timeout_secs.map(Duration::from_secs)))
    }

    pub fn executor(&self) -> &GraphExecutor {
        &self.executor
    }

    /// Answer one query.
    ///
    /// Rejections are an [`Answer`], not an error. Errors are capability
    /// failures (model, tool, dataset) or a run timeout.
    pub async fn answer(&self, query: &str) -> Result<Answer> {
        if let Err(rejection) = self.guardrails.check_input(query) {
            let reason = rejection.to_string();
            info!(reason = %reason, "Query rejected");
            self.events.publish(RunEvent::InputRejected {
                reason: reason.clone(),
            });
            // Rejected queries still end in the graph's Blocked stage; no node runs.
            let blocked = self.executor.execute(RunState::blocked(query)).await?;
            debug!(run_id = %blocked.run_id, stage = %blocked.final_stage, "Run blocked");
            return Ok(Answer::Rejected { reason });
        }

        let run = self.executor.execute(RunState::new(query));
        let result = match self.run_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| SciaError::RunTimeout(limit.as_secs()))??,
            None => run.await?,
        };

        if result.state.final_report.trim().is_empty() {
            warn!(run_id = %result.run_id, "Run produced an empty report");
        }

        Ok(Answer::Report {
            report: self.guardrails.check_output(&result.state.final_report),
            selected_units: result.state.selected_units,
            unit_outputs: result.state.unit_outputs,
            elapsed_ms: result.total_elapsed_ms,
        })
    }
}
