use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use scia_core::config::ModelConfig;
use scia_core::error::Result;
use scia_core::traits::LlmClient;
use scia_core::types::*;

use super::http::{open_event_stream, temperature};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Chat-completions client. Serves OpenAI and every preset backend (Ollama, Groq, ...).
pub struct OpenAiClient {
    http: Client,
}

impl OpenAiClient {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }
}

impl Default for OpenAiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct Chunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Option<ChoiceDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CallDelta>>,
}

#[derive(Deserialize)]
struct CallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Conversation in chat-completions form. Each tool result becomes its own `tool` message.
fn wire_messages(messages: &[ChatMessage]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => wire.push(json!({ "role": "system", "content": msg.text() })),
            Role::User | Role::Tool => {
                let mut results = msg
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => Some(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        })),
                        _ => None,
                    })
                    .peekable();

                if results.peek().is_some() {
                    wire.extend(results);
                } else {
                    wire.push(json!({ "role": "user", "content": msg.text() }));
                }
            }
            Role::Assistant => {
                let text = msg.text();
                let calls: Vec<Value> = msg
                    .tool_uses()
                    .into_iter()
                    .map(|(id, name, input)| {
                        json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        })
                    })
                    .collect();

                let mut entry = json!({ "role": "assistant", "content": text });
                if !calls.is_empty() {
                    if text.is_empty() {
                        entry["content"] = Value::Null;
                    }
                    entry["tool_calls"] = Value::Array(calls);
                }
                wire.push(entry);
            }
        }
    }

    wire
}

fn wire_tools(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                },
            })
        })
        .collect()
}

fn stop_reason(finish: &str) -> StopReason {
    match finish {
        "tool_calls" => StopReason::ToolUse,
        "length" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

/// Turn one SSE payload into deltas. Text and tool-call fragments come before the stop.
fn parse_chunk(data: &str) -> Vec<Result<StreamDelta>> {
    if data.trim() == "[DONE]" {
        return Vec::new();
    }

    let chunk: Chunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(data = %data, error = %e, "Unparseable completion chunk");
            return Vec::new();
        }
    };

    let mut deltas = Vec::new();
    if let Some(usage) = chunk.usage {
        deltas.push(Ok(StreamDelta::Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return deltas;
    };

    if let Some(delta) = choice.delta {
        if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
            deltas.push(Ok(StreamDelta::TextDelta(text)));
        }
        // Name and arguments may arrive in the same fragment.
        for call in delta.tool_calls.unwrap_or_default() {
            let Some(function) = call.function else {
                continue;
            };
            if let Some(name) = function.name {
                deltas.push(Ok(StreamDelta::ToolUseStart {
                    index: call.index,
                    id: call.id.unwrap_or_default(),
                    name,
                }));
            }
            if let Some(arguments) = function.arguments {
                deltas.push(Ok(StreamDelta::ToolInputDelta {
                    index: call.index,
                    delta: arguments,
                }));
            }
        }
    }

    if let Some(finish) = choice.finish_reason {
        deltas.push(Ok(StreamDelta::Stop(stop_reason(&finish))));
    }

    deltas
}

impl LlmClient for OpenAiClient {
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        let config = config.clone();
        let tools = wire_tools(tools);

        Box::pin(async move {
            let mut body = json!({
                "model": config.model_id,
                "messages": wire_messages(&messages),
                "max_tokens": config.max_tokens,
                "stream": true,
            });
            if let Some(t) = temperature(&config) {
                body["temperature"] = json!(t);
            }
            if tools.as_array().is_some_and(|t| !t.is_empty()) {
                body["tools"] = tools;
            }

            let url = config.base_url.as_deref().unwrap_or(OPENAI_API_URL);
            let mut req = self.http.post(url);
            if let Some(api_key) = &config.api_key {
                req = req.bearer_auth(api_key);
            }

            let events = open_event_stream(req, &config, &body).await?;
            Ok(events
                .flat_map(|event| stream::iter(parse_chunk(&event.data)))
                .boxed())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_results_become_tool_messages() {
        let wire = wire_messages(&[
            ChatMessage::system("You are a demand analyst."),
            ChatMessage {
                role: Role::User,
                content: vec![
                    ContentBlock::ToolResult {
                        tool_use_id: "call_1".into(),
                        content: "[]".into(),
                        is_error: false,
                    },
                    ContentBlock::ToolResult {
                        tool_use_id: "call_2".into(),
                        content: "P001".into(),
                        is_error: false,
                    },
                ],
                timestamp: None,
            },
        ]);
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_call_id"], "call_1");
        assert_eq!(wire[2]["content"], "P001");
    }

    #[test]
    fn assistant_tool_call_has_null_content() {
        let wire = wire_messages(&[ChatMessage {
            role: Role::Assistant,
            content: vec![ContentBlock::ToolUse {
                id: "call_1".into(),
                name: "get_product_list".into(),
                input: json!({}),
            }],
            timestamp: None,
        }]);
        assert!(wire[0]["content"].is_null());
        assert_eq!(wire[0]["tool_calls"][0]["function"]["name"], "get_product_list");
        assert_eq!(wire[0]["tool_calls"][0]["function"]["arguments"], "{}");
    }

    #[test]
    fn name_and_arguments_in_one_chunk() {
        let deltas = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"forecast_demand","arguments":"{\"product_id\":\"P001\"}"}}]}}]}"#,
        );
        assert_eq!(deltas.len(), 2);
        assert!(matches!(&deltas[0], Ok(StreamDelta::ToolUseStart { name, .. }) if name == "forecast_demand"));
        assert!(matches!(&deltas[1], Ok(StreamDelta::ToolInputDelta { index: 0, .. })));
    }

    #[test]
    fn text_precedes_stop_in_final_chunk() {
        let deltas = parse_chunk(
            r#"{"choices":[{"delta":{"content":"supplier_analyst"},"finish_reason":"stop"}],"usage":{"prompt_tokens":40,"completion_tokens":3}}"#,
        );
        assert!(matches!(
            deltas.as_slice(),
            [
                Ok(StreamDelta::Usage { input_tokens: 40, output_tokens: 3 }),
                Ok(StreamDelta::TextDelta(t)),
                Ok(StreamDelta::Stop(StopReason::EndTurn)),
            ] if t == "supplier_analyst"
        ));
    }

    #[test]
    fn null_tool_calls_are_ignored() {
        let deltas = parse_chunk(r#"{"choices":[{"delta":{"content":"ok","tool_calls":null}}]}"#);
        assert_eq!(deltas.len(), 1);
    }

    #[test]
    fn done_marker_and_garbage_yield_nothing() {
        assert!(parse_chunk("[DONE]").is_empty());
        assert!(parse_chunk("{not json").is_empty());
    }
}
