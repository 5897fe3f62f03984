use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use scia_core::config::{DispatchPolicy, RetryConfig};
use scia_core::error::{Result, SciaError};
use scia_core::event::EventBus;
use scia_core::types::{ChatMessage, RunEvent, RunId, UnitId};
use scia_llm::invoke_with_retry;

use super::edge::conditional_targets;
use super::node::GraphNode;
use super::state::{RunState, StateUpdate};
use crate::specialist::Specialists;

/// Fans the run out to the selected units and merges their outputs.
///
/// Every unit sees the same turns. Under [`DispatchPolicy::Concurrent`] each
/// unit runs as its own task; the merge goes through a map keyed by unit,
/// so completion order never shows in the result. The first failure in
/// selection order aborts the run, after every task has been joined.
pub struct Dispatcher {
    specialists: Specialists,
    policy: DispatchPolicy,
    max_concurrency: usize,
    retry: RetryConfig,
    events: Arc<EventBus>,
}

impl Dispatcher {
    pub fn new(
        specialists: Specialists,
        policy: DispatchPolicy,
        max_concurrency: usize,
        retry: RetryConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            specialists,
            policy,
            max_concurrency: max_concurrency.max(1),
            retry,
            events,
        }
    }

    pub fn policy(&self) -> DispatchPolicy {
        self.policy
    }

    pub async fn dispatch(
        &self,
        run_id: &RunId,
        selected: &[UnitId],
        turns: &[ChatMessage],
    ) -> Result<StateUpdate> {
        debug!(policy = %self.policy, units = ?selected, "Dispatching");
        match self.policy {
            DispatchPolicy::Sequential => self.dispatch_sequential(run_id, selected, turns).await,
            DispatchPolicy::Concurrent => self.dispatch_concurrent(run_id, selected, turns).await,
        }
    }

    async fn dispatch_sequential(
        &self,
        run_id: &RunId,
        selected: &[UnitId],
        turns: &[ChatMessage],
    ) -> Result<StateUpdate> {
        let mut update = StateUpdate::default();
        for &unit in selected {
            let output = invoke_unit(
                &self.specialists,
                &self.retry,
                &self.events,
                run_id,
                unit,
                turns.to_vec(),
            )
            .await?;
            update.merge(StateUpdate::unit_output(unit, output));
        }
        Ok(update)
    }

    async fn dispatch_concurrent(
        &self,
        run_id: &RunId,
        selected: &[UnitId],
        turns: &[ChatMessage],
    ) -> Result<StateUpdate> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (idx, &unit) in selected.iter().enumerate() {
            let specialists = self.specialists.clone();
            let retry = self.retry.clone();
            let events = self.events.clone();
            let run_id = run_id.clone();
            let turns = turns.to_vec();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (
                            idx,
                            Err(SciaError::UnitJoin {
                                unit: unit.to_string(),
                                message: e.to_string(),
                            }),
                        )
                    }
                };
                let result =
                    invoke_unit(&specialists, &retry, &events, &run_id, unit, turns).await;
                (idx, result)
            });
        }

        let mut slots: Vec<Option<Result<String>>> = selected.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(e) => error!(error = %e, "Specialist task aborted"),
            }
        }

        let mut update = StateUpdate::default();
        for (&unit, slot) in selected.iter().zip(slots) {
            let output = slot.unwrap_or_else(|| {
                Err(SciaError::UnitJoin {
                    unit: unit.to_string(),
                    message: "task panicked or was cancelled".into(),
                })
            })?;
            update.merge(StateUpdate::unit_output(unit, output));
        }
        Ok(update)
    }
}

/// Invoke one unit under the retry policy, with start/finish events.
async fn invoke_unit(
    specialists: &Specialists,
    retry: &RetryConfig,
    events: &EventBus,
    run_id: &RunId,
    unit: UnitId,
    turns: Vec<ChatMessage>,
) -> Result<String> {
    let specialist = specialists.get(unit);
    let start = Instant::now();
    events.publish(RunEvent::UnitStarted {
        run_id: run_id.clone(),
        unit,
    });
    info!(unit = %unit, "Specialist started");

    let result = invoke_with_retry(retry, Some(events), || {
        specialist.invoke(run_id.clone(), turns.clone())
    })
    .await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    match &result {
        Ok(output) => {
            info!(unit = %unit, elapsed_ms, chars = output.len(), "Specialist finished");
            events.publish(RunEvent::UnitFinished {
                run_id: run_id.clone(),
                unit,
                elapsed_ms,
            });
        }
        Err(e) => error!(unit = %unit, elapsed_ms, error = %e, "Specialist failed"),
    }
    result
}

impl GraphNode for Dispatcher {
    fn name(&self) -> &'static str {
        "dispatch"
    }

    fn run<'a>(
        &'a self,
        run_id: &'a RunId,
        state: &'a RunState,
    ) -> BoxFuture<'a, Result<StateUpdate>> {
        Box::pin(async move {
            let targets = conditional_targets(&state.selected_units);
            self.dispatch(run_id, &targets, &state.turns).await
        })
    }
}
