use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one end-to-end run of the orchestration graph.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A specialist unit the router can select.
///
/// The set is closed: adding a unit means adding a variant, and every
/// `match` over `UnitId` (prompts, tool subsets, the unit roster) has to
/// account for it. Declaration order is the canonical order used for
/// routing fallbacks and report sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitId {
    DemandAnalyst,
    InventoryMonitor,
    SupplierAnalyst,
}

impl UnitId {
    /// Every unit, in canonical order.
    pub const ALL: [UnitId; 3] = [
        UnitId::DemandAnalyst,
        UnitId::InventoryMonitor,
        UnitId::SupplierAnalyst,
    ];

    /// Wire identifier (`demand_analyst`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DemandAnalyst => "demand_analyst",
            Self::InventoryMonitor => "inventory_monitor",
            Self::SupplierAnalyst => "supplier_analyst",
        }
    }

    /// Section heading: underscores become spaces, words title-cased.
    pub fn heading(&self) -> String {
        self.as_str()
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// One-line summary of what the unit is responsible for.
    pub fn responsibility(&self) -> &'static str {
        match self {
            Self::DemandAnalyst => "Sales trends, demand forecasting, seasonal patterns",
            Self::InventoryMonitor => "Stock levels, stockout risks, reorder alerts",
            Self::SupplierAnalyst => "Supplier performance, lead times, costs, market context",
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "demand_analyst" => Ok(Self::DemandAnalyst),
            "inventory_monitor" => Ok(Self::InventoryMonitor),
            "supplier_analyst" => Ok(Self::SupplierAnalyst),
            other => Err(format!("unknown specialist unit: {}", other)),
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A chat message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentBlock::Text { text: text.into() }],
            timestamp: Some(Utc::now()),
        }
    }

    /// Extract all text content from this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Extract all tool use blocks from this message.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &serde_json::Value)> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
                _ => None,
            })
            .collect()
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// Start of a tool use block.
    ToolUseStart {
        index: usize,
        id: String,
        name: String,
    },

    /// A chunk of tool use input JSON.
    ToolInputDelta { index: usize, delta: String },

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}

/// Result of a tool execution.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool definition for sending to the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub run_id: RunId,
    pub unit: UnitId,
}

/// Event broadcast to all subscribers while a run progresses.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// The input guardrail rejected a query; the graph was never entered.
    InputRejected { reason: String },
    /// A run entered the graph.
    RunStarted { run_id: RunId },
    /// A graph node started.
    NodeStarted { run_id: RunId, node: String },
    /// A graph node finished.
    NodeFinished { run_id: RunId, node: String, elapsed_ms: u64 },
    /// The router settled on a set of units.
    UnitsSelected { run_id: RunId, units: Vec<UnitId> },
    /// A specialist unit started.
    UnitStarted { run_id: RunId, unit: UnitId },
    /// A specialist unit returned its output.
    UnitFinished { run_id: RunId, unit: UnitId, elapsed_ms: u64 },
    /// A tool call started inside a specialist unit.
    ToolStart { unit: UnitId, name: String, input: serde_json::Value },
    /// A tool call finished inside a specialist unit.
    ToolEnd { unit: UnitId, name: String, is_error: bool },
    /// A rate-limited call is being retried after a backoff.
    RetryScheduled { attempt: u32, backoff_secs: u64 },
    /// The run produced a report.
    RunComplete { run_id: RunId, elapsed_ms: u64 },
    /// The run failed.
    RunFailed { run_id: RunId, error: String },
}
