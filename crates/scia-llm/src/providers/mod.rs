pub mod anthropic;
mod http;
pub mod openai;
pub mod presets;

pub use anthropic::AnthropicClient;
pub use openai::OpenAiClient;
