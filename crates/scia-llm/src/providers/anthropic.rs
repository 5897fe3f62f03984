use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use scia_core::config::ModelConfig;
use scia_core::error::{Result, SciaError};
use scia_core::traits::LlmClient;
use scia_core::types::*;

use super::http::{open_event_stream, temperature};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API client.
pub struct AnthropicClient {
    http: Client,
}

impl AnthropicClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for AnthropicClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Event {
    ContentBlockStart { index: usize, content_block: Block },
    ContentBlockDelta { index: usize, delta: BlockDelta },
    MessageDelta {
        delta: MessageDelta,
        #[serde(default)]
        usage: Option<Usage>,
    },
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    ToolUse { id: String, name: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct MessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Split out the system prompt; every other turn keeps its content blocks as-is.
fn wire_messages(messages: &[ChatMessage]) -> Result<(Option<String>, Vec<Value>)> {
    let mut system: Option<String> = None;
    let mut wire = Vec::with_capacity(messages.len());

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                let text = msg.text();
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, text),
                    None => text,
                });
                continue;
            }
            Role::Assistant => "assistant",
            Role::User | Role::Tool => "user",
        };
        wire.push(json!({ "role": role, "content": serde_json::to_value(&msg.content)? }));
    }

    Ok((system, wire))
}

fn parse_event(data: &str) -> Vec<Result<StreamDelta>> {
    let event: Event = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            warn!(data = %data, error = %e, "Unparseable message event");
            return Vec::new();
        }
    };

    match event {
        Event::ContentBlockStart {
            index,
            content_block: Block::ToolUse { id, name },
        } => vec![Ok(StreamDelta::ToolUseStart { index, id, name })],
        Event::ContentBlockDelta { index, delta } => match delta {
            BlockDelta::TextDelta { text } => vec![Ok(StreamDelta::TextDelta(text))],
            BlockDelta::InputJsonDelta { partial_json } => vec![Ok(StreamDelta::ToolInputDelta {
                index,
                delta: partial_json,
            })],
            BlockDelta::Other => Vec::new(),
        },
        Event::MessageDelta { delta, usage } => {
            let mut deltas = Vec::new();
            if let Some(usage) = usage {
                deltas.push(Ok(StreamDelta::Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                }));
            }
            let stop = match delta.stop_reason.as_deref() {
                Some("tool_use") => Some(StopReason::ToolUse),
                Some("max_tokens") => Some(StopReason::MaxTokens),
                Some(_) => Some(StopReason::EndTurn),
                None => None,
            };
            deltas.extend(stop.map(|s| Ok(StreamDelta::Stop(s))));
            deltas
        }
        Event::Error { error } => vec![Err(SciaError::LlmStream(error.message))],
        Event::ContentBlockStart { .. } | Event::Other => Vec::new(),
    }
}

impl LlmClient for AnthropicClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools: Vec<Value> = tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "input_schema": t.input_schema,
                })
            })
            .collect();

        Box::pin(async move {
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| SciaError::Config("Anthropic API key not set".into()))?;

            let (system, wire) = wire_messages(&messages)?;
            let mut body = json!({
                "model": config.model_id,
                "max_tokens": config.max_tokens,
                "messages": wire,
                "stream": true,
            });
            if let Some(system) = system {
                body["system"] = Value::String(system);
            }
            if let Some(t) = temperature(&config) {
                body["temperature"] = json!(t);
            }
            if !tools.is_empty() {
                body["tools"] = Value::Array(tools);
            }

            let url = config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);
            let req = self
                .http
                .post(url)
                .header("x-api-key", api_key)
                .header("anthropic-version", ANTHROPIC_VERSION);

            let events = open_event_stream(req, &config, &body).await?;
            Ok(events
                .flat_map(|event| stream::iter(parse_event(&event.data)))
                .boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_messages_fold_into_system_field() {
        let (system, wire) = wire_messages(&[
            ChatMessage::system("You are a coordinator."),
            ChatMessage::system("Answer briefly."),
            ChatMessage::user("What products are at risk?"),
        ])
        .unwrap();
        assert_eq!(
            system.as_deref(),
            Some("You are a coordinator.\n\nAnswer briefly.")
        );
        assert_eq!(wire.len(), 1);
        assert_eq!(wire[0]["role"], "user");
        assert_eq!(wire[0]["content"][0]["text"], "What products are at risk?");
    }

    #[test]
    fn tool_result_keeps_block_shape() {
        let (_, wire) = wire_messages(&[ChatMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".into(),
                content: "P002 stock 0".into(),
                is_error: false,
            }],
            timestamp: None,
        }])
        .unwrap();
        let block = &wire[0]["content"][0];
        assert_eq!(block["type"], "tool_result");
        assert_eq!(block["tool_use_id"], "toolu_1");
    }

    #[test]
    fn text_and_tool_deltas_parse() {
        let text = parse_event(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"inventory_monitor"}}"#,
        );
        assert!(matches!(text.as_slice(), [Ok(StreamDelta::TextDelta(t))] if t == "inventory_monitor"));

        let start = parse_event(
            r#"{"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_latest_inventory","input":{}}}"#,
        );
        assert!(matches!(
            start.as_slice(),
            [Ok(StreamDelta::ToolUseStart { index: 1, name, .. })] if name == "get_latest_inventory"
        ));
    }

    #[test]
    fn message_delta_yields_usage_then_stop() {
        let deltas = parse_event(
            r#"{"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":12}}"#,
        );
        assert!(matches!(
            deltas.as_slice(),
            [
                Ok(StreamDelta::Usage { output_tokens: 12, .. }),
                Ok(StreamDelta::Stop(StopReason::ToolUse)),
            ]
        ));
    }

    #[test]
    fn bookkeeping_events_yield_nothing() {
        assert!(parse_event(r#"{"type":"ping"}"#).is_empty());
        assert!(parse_event(r#"{"type":"message_start","message":{"id":"msg_1"}}"#).is_empty());
        assert!(parse_event(
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#
        )
        .is_empty());
    }

    #[test]
    fn api_error_becomes_stream_error() {
        let deltas = parse_event(
            r#"{"type":"error","error":{"type":"rate_limit_error","message":"rate_limit exceeded"}}"#,
        );
        assert!(matches!(deltas.as_slice(), [Err(SciaError::LlmStream(m))] if m.contains("rate_limit")));
    }
}
