use std::sync::Arc;

use futures::future::BoxFuture;
use futures::StreamExt;
use tracing::{debug, error, info, warn};

use scia_core::config::{AppConfig, ModelConfig};
use scia_core::error::{Result, SciaError};
use scia_core::event::EventBus;
use scia_core::traits::{LlmClient, SpecialistUnit};
use scia_core::types::*;
use scia_tools::{SalesDataset, ToolRegistry};

/// Tool output kept in the conversation, in characters.
const MAX_TOOL_OUTPUT_CHARS: usize = 8_000;

/// Role instructions for each built-in unit.
pub fn system_prompt(unit: UnitId) -> &'static str {
    match unit {
        UnitId::DemandAnalyst => {
            "You are a Demand Analyst agent for a CPG supply chain team.\n\n\
             Your role:\n\
             - Analyze historical sales data to identify demand patterns and trends\n\
             - Generate demand forecasts using available tools\n\
             - Identify seasonal patterns, spikes, or declining trends\n\
             - Provide actionable insights about future demand\n\n\
             Always use tools to query actual data before making conclusions. \
             Structure your response with clear findings and a brief recommendation."
        }
        UnitId::InventoryMonitor => {
            "You are an Inventory Monitor agent for a CPG supply chain team.\n\n\
             Your role:\n\
             - Monitor current stock levels across all products\n\
             - Identify products at risk of stockout by comparing stock to reorder points\n\
             - Calculate days-of-supply remaining for products\n\
             - Flag critical and warning-level inventory situations\n\
             - Recommend reorder actions with urgency levels\n\n\
             Always use tools to check actual inventory data before making assessments. \
             Prioritize alerts by risk level: critical first, then warning."
        }
        UnitId::SupplierAnalyst => {
            "You are a Supplier Analyst agent for a CPG supply chain team.\n\n\
             Your role:\n\
             - Evaluate supplier performance based on lead times, costs, and reliability\n\
             - Compare suppliers across key metrics\n\
             - Search for relevant market news or supply chain disruptions\n\
             - Identify supplier risks and recommend diversification strategies\n\n\
             Always use tools to pull supplier data and search for current market context. \
             Provide a balanced assessment with both data-driven metrics and market context."
        }
    }
}

/// Keep at most `max_chars` characters, cutting at the last newline when
/// there is one.
pub fn compact_tool_output(output: &str, max_chars: usize) -> String {
    let Some((cut, _)) = output.char_indices().nth(max_chars) else {
        return output.to_string();
    };
    let head = &output[..cut];
    let head = match head.rfind('\n') {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };
    format!("{}\n[truncated]", head)
}

/// Accumulator for streaming tool call deltas.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    input_json: String,
}

/// A specialist backed by a model and a tool subset.
///
/// Runs a bounded tool loop: the model may call its tools for several turns,
/// and the text of the first turn without tool calls is the unit's output.
pub struct LlmSpecialist {
    id: UnitId,
    llm: Arc<dyn LlmClient>,
    model: ModelConfig,
    tools: ToolRegistry,
    max_turns: usize,
    events: Arc<EventBus>,
}

impl LlmSpecialist {
    pub fn new(
        id: UnitId,
        llm: Arc<dyn LlmClient>,
        model: ModelConfig,
        tools: ToolRegistry,
        max_turns: usize,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            id,
            llm,
            model,
            tools,
            max_turns,
            events,
        }
    }

    async fn run(&self, run_id: RunId, turns: Vec<ChatMessage>) -> Result<String> {
        let tool_defs = self.tools.definitions();
        let ctx = ToolContext {
            run_id,
            unit: self.id,
        };

        let mut messages = Vec::with_capacity(turns.len() + 1);
        messages.push(ChatMessage::system(system_prompt(self.id)));
        messages.extend(turns);

        for turn in 0..self.max_turns {
            debug!(unit = %self.id, turn, "Starting specialist turn");

            let mut stream = self
                .llm
                .chat_stream(&self.model, messages.clone(), &tool_defs)
                .await?;

            let mut text_content = String::new();
            let mut tool_calls: Vec<ToolCallAccumulator> = Vec::new();
            let mut stop_reason = None;

            while let Some(delta) = stream.next().await {
                match delta? {
                    StreamDelta::TextDelta(text) => text_content.push_str(&text),
                    StreamDelta::ToolUseStart { index, id, name } => {
                        while tool_calls.len() <= index {
                            tool_calls.push(ToolCallAccumulator::default());
                        }
                        tool_calls[index].id = id;
                        tool_calls[index].name = name;
                    }
                    StreamDelta::ToolInputDelta { index, delta } => {
                        if let Some(tc) = tool_calls.get_mut(index) {
                            tc.input_json.push_str(&delta);
                        }
                    }
                    StreamDelta::Stop(reason) => stop_reason = Some(reason),
                    StreamDelta::Usage {
                        input_tokens,
                        output_tokens,
                    } => {
                        debug!(unit = %self.id, input_tokens, output_tokens, "Token usage");
                    }
                }
            }
            drop(stream);

            // Providers may stream an index gap; unnamed slots are not calls.
            tool_calls.retain(|tc| !tc.name.is_empty());

            if tool_calls.is_empty() {
                if stop_reason == Some(StopReason::MaxTokens) {
                    warn!(unit = %self.id, "Model hit max tokens");
                }
                info!(unit = %self.id, turns = turn + 1, "Specialist finished");
                return Ok(text_content);
            }

            let parsed_inputs: Vec<serde_json::Value> = tool_calls
                .iter()
                .map(|tc| {
                    if tc.input_json.trim().is_empty() {
                        serde_json::json!({})
                    } else {
                        serde_json::from_str(&tc.input_json).unwrap_or(serde_json::Value::Null)
                    }
                })
                .collect();

            let mut content_blocks = Vec::new();
            if !text_content.is_empty() {
                content_blocks.push(ContentBlock::Text { text: text_content });
            }
            for (tc, input) in tool_calls.iter().zip(parsed_inputs.iter()) {
                content_blocks.push(ContentBlock::ToolUse {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    input: input.clone(),
                });
            }
            messages.push(ChatMessage {
                role: Role::Assistant,
                content: content_blocks,
                timestamp: Some(chrono::Utc::now()),
            });

            let mut result_blocks = Vec::with_capacity(tool_calls.len());
            for (tc, input) in tool_calls.iter().zip(parsed_inputs) {
                self.events.publish(RunEvent::ToolStart {
                    unit: self.id,
                    name: tc.name.clone(),
                    input: input.clone(),
                });

                let result = match self.tools.execute(&tc.name, input, ctx.clone()).await {
                    Ok(r) => r,
                    Err(e) => {
                        error!(unit = %self.id, tool = %tc.name, error = %e, "Tool execution failed");
                        ToolResult::error(e.to_string())
                    }
                };

                self.events.publish(RunEvent::ToolEnd {
                    unit: self.id,
                    name: tc.name.clone(),
                    is_error: result.is_error,
                });

                result_blocks.push(ContentBlock::ToolResult {
                    tool_use_id: tc.id.clone(),
                    content: compact_tool_output(&result.content, MAX_TOOL_OUTPUT_CHARS),
                    is_error: result.is_error,
                });
            }

            messages.push(ChatMessage {
                role: Role::User,
                content: result_blocks,
                timestamp: Some(chrono::Utc::now()),
            });
        }

        Err(SciaError::MaxTurnsExceeded {
            unit: self.id.to_string(),
            max_turns: self.max_turns,
        })
    }
}

impl SpecialistUnit for LlmSpecialist {
    fn id(&self) -> UnitId {
        self.id
    }

    fn invoke(&self, run_id: RunId, turns: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.run(run_id, turns))
    }
}

/// The unit roster, one slot per [`UnitId`].
///
/// A field per unit keeps lookup total: there is no "unit not found" path.
#[derive(Clone)]
pub struct Specialists {
    demand: Arc<dyn SpecialistUnit>,
    inventory: Arc<dyn SpecialistUnit>,
    supplier: Arc<dyn SpecialistUnit>,
}

impl Specialists {
    /// Each slot must hold the unit it is named for.
    pub fn new(
        demand: Arc<dyn SpecialistUnit>,
        inventory: Arc<dyn SpecialistUnit>,
        supplier: Arc<dyn SpecialistUnit>,
    ) -> Result<Self> {
        for (expected, unit) in [
            (UnitId::DemandAnalyst, &demand),
            (UnitId::InventoryMonitor, &inventory),
            (UnitId::SupplierAnalyst, &supplier),
        ] {
            if unit.id() != expected {
                return Err(SciaError::Config(format!(
                    "specialist slot {} holds {}",
                    expected,
                    unit.id()
                )));
            }
        }
        Ok(Self {
            demand,
            inventory,
            supplier,
        })
    }

    pub fn get(&self, unit: UnitId) -> &Arc<dyn SpecialistUnit> {
        match unit {
            UnitId::DemandAnalyst => &self.demand,
            UnitId::InventoryMonitor => &self.inventory,
            UnitId::SupplierAnalyst => &self.supplier,
        }
    }

    /// Model-backed units over the configured dataset.
    pub fn from_config(
        config: &AppConfig,
        llm: Arc<dyn LlmClient>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let path = config.data_path();
        let data = Arc::new(SalesDataset::load(&path)?);
        info!(path = %path.display(), rows = data.records().len(), "Loaded dataset");

        let build = |unit: UnitId| -> Arc<dyn SpecialistUnit> {
            Arc::new(LlmSpecialist::new(
                unit,
                llm.clone(),
                config.model.clone(),
                ToolRegistry::for_unit(unit, data.clone(), config.web_search.as_ref()),
                config.specialists.max_turns,
                events.clone(),
            ))
        };

        Self::new(
            build(UnitId::DemandAnalyst),
            build(UnitId::InventoryMonitor),
            build(UnitId::SupplierAnalyst),
        )
    }
}

impl std::fmt::Debug for Specialists {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Specialists")
            .field("units", &UnitId::ALL)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scia_test_utils::{
        test_app_config, test_model_config, write_dataset, MockLlm, MockReply, StaticSpecialist,
        SAMPLE_CSV,
    };

    fn specialist(unit: UnitId, llm: Arc<MockLlm>, max_turns: usize) -> LlmSpecialist {
        let data = Arc::new(SalesDataset::parse(SAMPLE_CSV).unwrap());
        LlmSpecialist::new(
            unit,
            llm,
            test_model_config(),
            ToolRegistry::for_unit(unit, data, None),
            max_turns,
            Arc::new(EventBus::default()),
        )
    }

    fn tool_result_text(messages: &[ChatMessage]) -> (String, bool) {
        messages
            .iter()
            .flat_map(|m| m.content.iter())
            .find_map(|b| match b {
                ContentBlock::ToolResult {
                    content, is_error, ..
                } => Some((content.clone(), *is_error)),
                _ => None,
            })
            .unwrap_or_default()
    }

    #[test]
    fn prompts_name_their_role() {
        assert!(system_prompt(UnitId::DemandAnalyst).starts_with("You are a Demand Analyst"));
        assert!(system_prompt(UnitId::InventoryMonitor).contains("critical first, then warning"));
        assert!(system_prompt(UnitId::SupplierAnalyst).contains("diversification"));
    }

    #[test]
    fn compact_keeps_short_output() {
        assert_eq!(compact_tool_output("P001 ok", 100), "P001 ok");
    }

    #[test]
    fn compact_cuts_at_newline() {
        let out = compact_tool_output("line one\nline two\nline three", 15);
        assert_eq!(out, "line one\n[truncated]");
    }

    #[test]
    fn compact_is_char_safe() {
        let out = compact_tool_output("ééééé", 2);
        assert_eq!(out, "éé\n[truncated]");
    }

    #[tokio::test]
    async fn answers_without_tools() {
        let llm = Arc::new(MockLlm::with_responses(vec![Ok("Demand is flat.".into())]));
        let unit = specialist(UnitId::DemandAnalyst, llm.clone(), 4);

        let out = unit
            .invoke(RunId::new(), vec![ChatMessage::user("Analyze demand")])
            .await
            .unwrap();
        assert_eq!(out, "Demand is flat.");

        let request = &llm.requests()[0];
        assert_eq!(request[0].role, Role::System);
        assert_eq!(request[0].text(), system_prompt(UnitId::DemandAnalyst));
    }

    #[tokio::test]
    async fn feeds_tool_results_back() {
        let llm = Arc::new(MockLlm::scripted(vec![
            MockReply::ToolCall {
                name: "get_latest_inventory".into(),
                input: serde_json::json!({}),
            },
            MockReply::Text("P002 is out of stock.".into()),
        ]));
        let unit = specialist(UnitId::InventoryMonitor, llm.clone(), 4);
        let events = unit.events.clone();
        let mut rx = events.subscribe();

        let out = unit
            .invoke(RunId::new(), vec![ChatMessage::user("What is at risk?")])
            .await
            .unwrap();
        assert_eq!(out, "P002 is out of stock.");
        assert_eq!(llm.call_count(), 2);

        let (content, is_error) = tool_result_text(&llm.requests()[1]);
        assert!(!is_error);
        assert!(content.contains("P002"));

        assert!(matches!(rx.try_recv(), Ok(RunEvent::ToolStart { unit: UnitId::InventoryMonitor, .. })));
        assert!(matches!(rx.try_recv(), Ok(RunEvent::ToolEnd { is_error: false, .. })));
    }

    #[tokio::test]
    async fn tool_outside_subset_is_reported_to_model() {
        let llm = Arc::new(MockLlm::scripted(vec![
            MockReply::ToolCall {
                name: "forecast_demand".into(),
                input: serde_json::json!({"product_id": "P001"}),
            },
            MockReply::Text("Could not forecast.".into()),
        ]));
        let unit = specialist(UnitId::SupplierAnalyst, llm.clone(), 4);

        let out = unit.invoke(RunId::new(), vec![ChatMessage::user("suppliers")]).await.unwrap();
        assert_eq!(out, "Could not forecast.");

        let (content, is_error) = tool_result_text(&llm.requests()[1]);
        assert!(is_error);
        assert!(content.contains("forecast_demand"));
    }

    #[tokio::test]
    async fn endless_tool_calls_hit_turn_limit() {
        let call = || MockReply::ToolCall {
            name: "get_product_list".into(),
            input: serde_json::json!({}),
        };
        let llm = Arc::new(MockLlm::scripted(vec![call(), call(), call()]));
        let unit = specialist(UnitId::DemandAnalyst, llm, 2);

        let err = unit.invoke(RunId::new(), vec![ChatMessage::user("loop")]).await.unwrap_err();
        assert!(matches!(err, SciaError::MaxTurnsExceeded { max_turns: 2, .. }));
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let llm = Arc::new(MockLlm::with_responses(vec![Err(SciaError::LlmRequest(
            "HTTP 429 Too Many Requests".into(),
        ))]));
        let unit = specialist(UnitId::DemandAnalyst, llm, 2);
        let err = unit.invoke(RunId::new(), vec![ChatMessage::user("x")]).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn roster_rejects_misplaced_unit() {
        let result = Specialists::new(
            Arc::new(StaticSpecialist::new(UnitId::InventoryMonitor, "a")),
            Arc::new(StaticSpecialist::new(UnitId::InventoryMonitor, "b")),
            Arc::new(StaticSpecialist::new(UnitId::SupplierAnalyst, "c")),
        );
        assert!(matches!(result, Err(SciaError::Config(_))));
    }

    #[test]
    fn roster_lookup_is_total() {
        let roster = Specialists::new(
            Arc::new(StaticSpecialist::new(UnitId::DemandAnalyst, "a")),
            Arc::new(StaticSpecialist::new(UnitId::InventoryMonitor, "b")),
            Arc::new(StaticSpecialist::new(UnitId::SupplierAnalyst, "c")),
        )
        .unwrap();
        for unit in UnitId::ALL {
            assert_eq!(roster.get(unit).id(), unit);
        }
    }

    #[test]
    fn from_config_loads_dataset() {
        let file = write_dataset(SAMPLE_CSV);
        let mut config = test_app_config();
        config.specialists.data_path = file.path().display().to_string();
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlm::with_responses(vec![]));
        assert!(Specialists::from_config(&config, llm, Arc::new(EventBus::default())).is_ok());
    }

    #[test]
    fn from_config_missing_dataset_fails() {
        let mut config = test_app_config();
        config.specialists.data_path = "/nonexistent/scia/sales.csv".into();
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlm::with_responses(vec![]));
        assert!(Specialists::from_config(&config, llm, Arc::new(EventBus::default())).is_err());
    }
}
