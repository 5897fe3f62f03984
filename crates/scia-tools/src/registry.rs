use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use scia_core::config::WebSearchConfig;
use scia_core::error::{Result, SciaError};
use scia_core::traits::Tool;
use scia_core::types::{ToolContext, ToolDefinition, ToolResult, UnitId};

use crate::builtin::*;
use crate::dataset::SalesDataset;

/// Registry of tools available to one specialist unit.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get tool definitions for sending to the LLM.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name, bounded by the tool's own timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| SciaError::ToolNotFound(name.to_string()))?;

        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(SciaError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// The tool subset a unit may call.
    ///
    /// `web_search` is only handed to the supplier analyst, and only when a
    /// search provider is configured.
    pub fn for_unit(
        unit: UnitId,
        data: Arc<SalesDataset>,
        web_search: Option<&WebSearchConfig>,
    ) -> Self {
        let mut registry = Self::new();

        match unit {
            UnitId::DemandAnalyst => {
                registry.register(QuerySalesDataTool::new(data.clone()));
                registry.register(ProductListTool::new(data.clone()));
                registry.register(ForecastDemandTool::new(data));
            }
            UnitId::InventoryMonitor => {
                registry.register(LatestInventoryTool::new(data.clone()));
                registry.register(ProductListTool::new(data.clone()));
                registry.register(DaysOfSupplyTool::new(data));
            }
            UnitId::SupplierAnalyst => {
                registry.register(SupplierSummaryTool::new(data.clone()));
                registry.register(QuerySalesDataTool::new(data));
                if let Some(config) = web_search {
                    registry.register(WebSearchTool::new(config));
                }
            }
        }

        debug!(unit = %unit, tools = ?registry.list(), "Built tool registry");
        registry
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use scia_core::types::RunId;
    use scia_test_utils::SAMPLE_CSV;

    fn data() -> Arc<SalesDataset> {
        Arc::new(SalesDataset::parse(SAMPLE_CSV).unwrap())
    }

    fn ctx(unit: UnitId) -> ToolContext {
        ToolContext {
            run_id: RunId::new(),
            unit,
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "never finishes in time"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn timeout_secs(&self) -> u64 {
            1
        }
        fn execute(
            &self,
            _input: serde_json::Value,
            _ctx: ToolContext,
        ) -> BoxFuture<'_, Result<ToolResult>> {
            Box::pin(async {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                Ok(ToolResult::success("late"))
            })
        }
    }

    #[test]
    fn unit_subsets() {
        let demand = ToolRegistry::for_unit(UnitId::DemandAnalyst, data(), None);
        assert_eq!(
            demand.list(),
            vec!["forecast_demand", "get_product_list", "query_sales_data"]
        );

        let inventory = ToolRegistry::for_unit(UnitId::InventoryMonitor, data(), None);
        assert_eq!(
            inventory.list(),
            vec!["calculate_days_of_supply", "get_latest_inventory", "get_product_list"]
        );
    }

    #[test]
    fn web_search_only_when_configured() {
        let without = ToolRegistry::for_unit(UnitId::SupplierAnalyst, data(), None);
        assert!(without.get("web_search").is_none());
        assert_eq!(without.len(), 2);

        let config = WebSearchConfig {
            provider: "tavily".into(),
            api_key: "k".into(),
        };
        let with = ToolRegistry::for_unit(UnitId::SupplierAnalyst, data(), Some(&config));
        assert!(with.get("web_search").is_some());
        assert_eq!(with.definitions().len(), 3);
    }

    #[tokio::test]
    async fn unknown_tool() {
        let registry = ToolRegistry::for_unit(UnitId::DemandAnalyst, data(), None);
        let err = registry
            .execute("get_latest_inventory", serde_json::json!({}), ctx(UnitId::DemandAnalyst))
            .await
            .unwrap_err();
        assert!(matches!(err, SciaError::ToolNotFound(name) if name == "get_latest_inventory"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_enforced() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        let err = registry
            .execute("slow", serde_json::json!({}), ctx(UnitId::DemandAnalyst))
            .await
            .unwrap_err();
        assert!(matches!(err, SciaError::ToolTimeout { timeout_secs: 1, .. }));
    }
}
