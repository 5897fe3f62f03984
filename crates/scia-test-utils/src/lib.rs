//! Mocks and fixtures shared by the scia test suites.

use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use tempfile::NamedTempFile;

use scia_core::config::{AppConfig, ModelConfig};
use scia_core::error::{Result, SciaError};
use scia_core::traits::{LlmClient, SpecialistUnit};
use scia_core::types::*;

/// One scripted model reply.
pub enum MockReply {
    /// Plain text, then `Stop(EndTurn)`.
    Text(String),
    /// A single tool call, then `Stop(ToolUse)`.
    ToolCall {
        name: String,
        input: serde_json::Value,
    },
    /// The request itself fails.
    Fail(SciaError),
}

type ReplyFn = dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync;

enum Script {
    Queue(Mutex<VecDeque<MockReply>>),
    Func(Box<ReplyFn>),
}

/// Scripted [`LlmClient`] that records every request it receives.
pub struct MockLlm {
    script: Script,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockLlm {
    /// Replies in order; an exhausted script fails the call.
    pub fn scripted(replies: Vec<MockReply>) -> Self {
        Self::new(Script::Queue(Mutex::new(replies.into())))
    }

    /// Text replies (or errors) in order.
    pub fn with_responses(responses: Vec<Result<String>>) -> Self {
        Self::scripted(
            responses
                .into_iter()
                .map(|r| match r {
                    Ok(text) => MockReply::Text(text),
                    Err(e) => MockReply::Fail(e),
                })
                .collect(),
        )
    }

    /// Compute each text reply from the request messages.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String> + Send + Sync + 'static,
    {
        Self::new(Script::Func(Box::new(f)))
    }

    fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages of every request so far, oldest first.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_reply(&self, messages: &[ChatMessage]) -> MockReply {
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front())
                .unwrap_or_else(|| {
                    MockReply::Fail(SciaError::LlmRequest("mock script exhausted".into()))
                }),
            Script::Func(f) => match f(messages) {
                Ok(text) => MockReply::Text(text),
                Err(e) => MockReply::Fail(e),
            },
        }
    }
}

impl LlmClient for MockLlm {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
        _tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.next_reply(&messages);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(messages);
        }

        Box::pin(async move {
            let deltas: Vec<Result<StreamDelta>> = match reply {
                MockReply::Text(text) => vec![
                    Ok(StreamDelta::TextDelta(text)),
                    Ok(StreamDelta::Stop(StopReason::EndTurn)),
                ],
                MockReply::ToolCall { name, input } => vec![
                    Ok(StreamDelta::ToolUseStart {
                        index: 0,
                        id: format!("call_{}", n),
                        name,
                    }),
                    Ok(StreamDelta::ToolInputDelta {
                        index: 0,
                        delta: input.to_string(),
                    }),
                    Ok(StreamDelta::Stop(StopReason::ToolUse)),
                ],
                MockReply::Fail(e) => return Err(e),
            };
            Ok(stream::iter(deltas).boxed())
        })
    }
}

/// Specialist that returns a fixed text, optionally after a delay.
pub struct StaticSpecialist {
    id: UnitId,
    output: String,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticSpecialist {
    pub fn new(id: UnitId, output: impl Into<String>) -> Self {
        Self {
            id,
            output: output.into(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpecialistUnit for StaticSpecialist {
    fn id(&self) -> UnitId {
        self.id
    }

    fn invoke(&self, _run_id: RunId, _turns: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.output.clone())
        })
    }
}

/// Specialist whose every invocation fails with `LlmRequest(message)`.
pub struct FailingSpecialist {
    id: UnitId,
    message: String,
    calls: AtomicUsize,
}

impl FailingSpecialist {
    pub fn new(id: UnitId, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpecialistUnit for FailingSpecialist {
    fn id(&self) -> UnitId {
        self.id
    }

    fn invoke(&self, _run_id: RunId, _turns: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let message = self.message.clone();
        Box::pin(async move { Err(SciaError::LlmRequest(message)) })
    }
}

/// Model config pointing at nothing; only meaningful with a mock client.
pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "mock".to_string(),
        model_id: "mock-model".to_string(),
        api_key: None,
        base_url: None,
        max_tokens: 1024,
        temperature: 0.0,
        extra_headers: HashMap::new(),
    }
}

/// Minimal app config with every optional section defaulted.
pub fn test_app_config() -> AppConfig {
    AppConfig {
        model: test_model_config(),
        orchestration: Default::default(),
        retry: Default::default(),
        specialists: Default::default(),
        web_search: None,
    }
}

/// Small dataset: two products, three days, two suppliers.
/// P002 runs out of stock on the last day.
pub const SAMPLE_CSV: &str = "\
date,product_id,product_name,quantity_sold,stock_level,reorder_point,supplier,lead_time_days,unit_cost
2024-01-01,P001,Lay's Classic,100,900,300,SupplierA,5,1.50
2024-01-01,P002,Pepsi 12-Pack,80,200,250,SupplierB,7,3.20
2024-01-02,P001,Lay's Classic,100,800,300,SupplierA,5,1.50
2024-01-02,P002,Pepsi 12-Pack,90,110,250,SupplierB,7,3.20
2024-01-03,P001,Lay's Classic,130,670,300,SupplierA,5,1.50
2024-01-03,P002,Pepsi 12-Pack,100,0,250,SupplierB,9,3.40
";

/// Write CSV text to a temp file that lives as long as the handle.
pub fn write_dataset(csv: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp dataset");
    file.write_all(csv.as_bytes()).expect("write temp dataset");
    file.flush().expect("flush temp dataset");
    file
}

/// Text of the last user turn in a request.
pub fn last_user_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text())
        .unwrap_or_default()
}
