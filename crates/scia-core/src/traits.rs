use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// LLM client with multi-provider streaming.
pub trait LlmClient: Send + Sync + 'static {
    /// Send a chat request and receive a stream of deltas.
    fn chat_stream(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
        tools: &[ToolDefinition],
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>>;
}

/// Tool callable by a specialist unit during its reasoning loop.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in LLM tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }
}

/// Specialist unit: an opaque capability that turns the conversation so far
/// into one domain-specific textual analysis.
///
/// Whatever happens inside (tool calls, several model turns) is invisible to
/// the orchestration graph; only the final text is observed.
pub trait SpecialistUnit: Send + Sync + 'static {
    /// Which unit this is.
    fn id(&self) -> UnitId;

    /// Produce the unit's analysis for the given turns.
    ///
    /// `run_id` identifies the graph run; it is only used for correlation
    /// (tool context, events).
    fn invoke(&self, run_id: RunId, turns: Vec<ChatMessage>) -> BoxFuture<'_, Result<String>>;
}
