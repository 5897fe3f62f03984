use futures::StreamExt;
use tracing::debug;

use scia_core::config::ModelConfig;
use scia_core::error::{Result, SciaError};
use scia_core::traits::LlmClient;
use scia_core::types::{ChatMessage, StreamDelta};

/// Run one tool-less model call and collect the streamed text.
///
/// Used wherever the orchestration graph needs "messages in, text out"
/// (routing and synthesis). Stream errors abort the call.
pub async fn complete_text(
    llm: &dyn LlmClient,
    config: &ModelConfig,
    messages: Vec<ChatMessage>,
) -> Result<String> {
    let mut stream = llm.chat_stream(config, messages, &[]).await?;
    let mut text = String::new();

    while let Some(delta) = stream.next().await {
        match delta? {
            StreamDelta::TextDelta(chunk) => text.push_str(&chunk),
            StreamDelta::Usage {
                input_tokens,
                output_tokens,
            } => debug!(input_tokens, output_tokens, "Completion usage"),
            StreamDelta::Stop(_) => break,
            StreamDelta::ToolUseStart { name, .. } => {
                return Err(SciaError::LlmParse(format!(
                    "model requested tool '{}' in a tool-less call",
                    name
                )));
            }
            _ => {}
        }
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scia_test_utils::{test_model_config, MockLlm};

    #[tokio::test]
    async fn collects_text_deltas() {
        let llm = MockLlm::with_responses(vec![Ok("demand_analyst, inventory_monitor".into())]);
        let text = complete_text(&llm, &test_model_config(), vec![ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(text, "demand_analyst, inventory_monitor");
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn request_error_propagates() {
        let llm = MockLlm::with_responses(vec![Err(SciaError::LlmRequest(
            "HTTP 500: upstream".into(),
        ))]);
        let err = complete_text(&llm, &test_model_config(), vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, SciaError::LlmRequest(_)));
    }
}
