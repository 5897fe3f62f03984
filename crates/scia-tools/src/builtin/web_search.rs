use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use scia_core::config::WebSearchConfig;
use scia_core::error::{Result, SciaError};
use scia_core::traits::Tool;
use scia_core::types::{ToolContext, ToolResult};

const TAVILY_URL: &str = "https://api.tavily.com/search";

/// Market and supplier news lookup for the supplier analyst.
///
/// Provider failures come back as error tool results so the unit can carry on
/// without web context.
pub struct WebSearchTool {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
}

impl WebSearchTool {
    pub fn new(config: &WebSearchConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            endpoint: TAVILY_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default = "default_max_results")]
    max_results: u64,
}

fn default_max_results() -> u64 {
    5
}

/// Format a Tavily response body as `Title / Snippet / URL` blocks.
fn format_results(body: &serde_json::Value) -> Option<String> {
    let results = body["results"].as_array()?;
    if results.is_empty() {
        return None;
    }
    Some(
        results
            .iter()
            .map(|r| {
                format!(
                    "Title: {}\nSnippet: {}\nURL: {}",
                    r["title"].as_str().unwrap_or(""),
                    r["content"].as_str().unwrap_or(""),
                    r["url"].as_str().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for supply chain news, market trends, or supplier information. \
         Returns top search results with titles, snippets, and URLs."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    fn timeout_secs(&self) -> u64 {
        20
    }

    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: SearchInput = serde_json::from_value(input)
                .map_err(|e| SciaError::ToolValidation(e.to_string()))?;

            let resp = match self
                .http
                .post(&self.endpoint)
                .json(&json!({
                    "api_key": self.api_key,
                    "query": p.query,
                    "max_results": p.max_results,
                }))
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(error = %e, "Web search request failed");
                    return Ok(ToolResult::error(format!("Search failed: {}", e)));
                }
            };

            if !resp.status().is_success() {
                let status = resp.status();
                warn!(%status, "Web search provider returned an error");
                return Ok(ToolResult::error(format!("Search failed: HTTP {}", status)));
            }

            let body: serde_json::Value = match resp.json().await {
                Ok(body) => body,
                Err(e) => return Ok(ToolResult::error(format!("Search failed: {}", e))),
            };

            Ok(ToolResult::success(
                format_results(&body).unwrap_or_else(|| "No search results found.".into()),
            ))
        })
    }
}
