pub mod complete;
pub mod providers;
pub mod retry;
pub mod streaming;

use scia_core::config::ModelConfig;
use scia_core::traits::LlmClient;

pub use complete::complete_text;
pub use providers::anthropic::AnthropicClient;
pub use providers::openai::OpenAiClient;
pub use providers::presets::apply_preset;
pub use retry::{backoff_for, invoke_with_retry, is_rate_limited};

/// Create an LLM client based on the provider name.
pub fn create_client(config: &ModelConfig) -> Box<dyn LlmClient> {
    match config.provider.as_str() {
        "anthropic" | "claude" => Box::new(AnthropicClient::new()),
        // Everything else speaks the chat-completions protocol
        _ => Box::new(OpenAiClient::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scia_core::error::SciaError;
    use scia_core::types::ChatMessage;
    use scia_test_utils::test_model_config;

    #[tokio::test]
    async fn anthropic_client_requires_api_key() {
        let mut config = test_model_config();
        config.provider = "anthropic".into();
        config.api_key = None;

        let client = create_client(&config);
        let err = match client
            .chat_stream(&config, vec![ChatMessage::user("stock levels?")], &[])
            .await
        {
            Ok(_) => panic!("request should not be sent without a key"),
            Err(e) => e,
        };
        assert!(matches!(err, SciaError::Config(ref m) if m.contains("Anthropic")));
    }

    #[tokio::test]
    async fn unreachable_compatible_backend_is_a_request_error() {
        let mut config = test_model_config();
        config.provider = "ollama".into();
        // Port 9 (discard) on loopback refuses connections.
        config.base_url = Some("http://127.0.0.1:9/v1/chat/completions".into());

        let client = create_client(&config);
        let err = match client
            .chat_stream(&config, vec![ChatMessage::user("stock levels?")], &[])
            .await
        {
            Ok(_) => panic!("nothing listens on the discard port"),
            Err(e) => e,
        };
        assert!(matches!(err, SciaError::LlmRequest(_)));
    }
}
