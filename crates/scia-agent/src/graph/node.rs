use std::sync::Arc;

use futures::future::BoxFuture;

use scia_core::config::{ModelConfig, RetryConfig};
use scia_core::error::Result;
use scia_core::event::EventBus;
use scia_core::traits::LlmClient;
use scia_core::types::{ChatMessage, RunId};
use scia_llm::{complete_text, invoke_with_retry};

use super::state::{RunState, StateUpdate};

/// A node of the orchestration graph.
///
/// Nodes read the current state and return a partial update; the executor
/// owns the state and applies updates between nodes.
pub trait GraphNode: Send + Sync {
    /// Node name used in logs and events.
    fn name(&self) -> &'static str;

    fn run<'a>(&'a self, run_id: &'a RunId, state: &'a RunState)
        -> BoxFuture<'a, Result<StateUpdate>>;
}

/// Language-model capability as the graph uses it: messages in, text out,
/// every call wrapped in the rate-limit retry policy.
#[derive(Clone)]
pub struct ModelCall {
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    retry: RetryConfig,
    events: Arc<EventBus>,
}

impl ModelCall {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        retry: RetryConfig,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            llm,
            model,
            retry,
            events,
        }
    }

    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String> {
        invoke_with_retry(&self.retry, Some(self.events.as_ref()), || {
            complete_text(self.llm.as_ref(), &self.model, messages.clone())
        })
        .await
    }
}
