use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use scia_core::error::{Result, SciaError};
use scia_core::traits::Tool;
use scia_core::types::{ToolContext, ToolResult};

use crate::dataset::{render_table, SalesDataset, SalesRecord};

fn record_row(r: &SalesRecord) -> Vec<String> {
    vec![
        r.date.to_string(),
        r.product_id.clone(),
        r.product_name.clone(),
        r.quantity_sold.to_string(),
        r.stock_level.to_string(),
        r.reorder_point.to_string(),
        r.supplier.clone(),
        r.lead_time_days.to_string(),
        format!("{:.2}", r.unit_cost),
    ]
}

// ── QuerySalesDataTool ──────────────────────────────────────────

pub struct QuerySalesDataTool {
    data: Arc<SalesDataset>,
}

impl QuerySalesDataTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

#[derive(Deserialize, Default)]
struct SalesFilter {
    #[serde(default)]
    product_id: Option<String>,
    #[serde(default)]
    supplier: Option<String>,
}

impl Tool for QuerySalesDataTool {
    fn name(&self) -> &str {
        "query_sales_data"
    }
    fn description(&self) -> &str {
        "Query supply chain sales data. Optionally filter by product_id (e.g. 'P001') or \
         supplier (e.g. 'SupplierA'). Returns a table of matching records."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "Product ID such as P001" },
                "supplier": { "type": "string", "description": "Supplier name such as SupplierA" }
            }
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: SalesFilter = serde_json::from_value(input)
                .map_err(|e| SciaError::ToolValidation(e.to_string()))?;
            let rows: Vec<Vec<String>> = self
                .data
                .records()
                .iter()
                .filter(|r| p.product_id.as_deref().map_or(true, |id| r.product_id == id))
                .filter(|r| p.supplier.as_deref().map_or(true, |s| r.supplier == s))
                .map(record_row)
                .collect();
            if rows.is_empty() {
                return Ok(ToolResult::success("No data found for the given filters."));
            }
            let headers = [
                "date",
                "product_id",
                "product_name",
                "quantity_sold",
                "stock_level",
                "reorder_point",
                "supplier",
                "lead_time_days",
                "unit_cost",
            ];
            Ok(ToolResult::success(render_table(&headers, &rows)))
        })
    }
}

// ── ProductListTool ─────────────────────────────────────────────

pub struct ProductListTool {
    data: Arc<SalesDataset>,
}

impl ProductListTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

impl Tool for ProductListTool {
    fn name(&self) -> &str {
        "get_product_list"
    }
    fn description(&self) -> &str {
        "Get a list of all products in the supply chain dataset with their IDs and names."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let rows: Vec<Vec<String>> = self
                .data
                .products()
                .into_iter()
                .map(|(id, name)| vec![id.to_string(), name.to_string()])
                .collect();
            Ok(ToolResult::success(render_table(
                &["product_id", "product_name"],
                &rows,
            )))
        })
    }
}

// ── LatestInventoryTool ─────────────────────────────────────────

pub struct LatestInventoryTool {
    data: Arc<SalesDataset>,
}

impl LatestInventoryTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

#[derive(Deserialize, Default)]
struct ProductFilter {
    #[serde(default)]
    product_id: Option<String>,
}

impl Tool for LatestInventoryTool {
    fn name(&self) -> &str {
        "get_latest_inventory"
    }
    fn description(&self) -> &str {
        "Get the most recent inventory snapshot for each product. Optionally filter by \
         product_id. Shows stock_level, reorder_point, supplier, and lead_time_days."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "Product ID such as P001" }
            }
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: ProductFilter = serde_json::from_value(input)
                .map_err(|e| SciaError::ToolValidation(e.to_string()))?;
            let rows: Vec<Vec<String>> = self
                .data
                .latest_per_product()
                .into_iter()
                .filter(|r| p.product_id.as_deref().map_or(true, |id| r.product_id == id))
                .map(|r| {
                    vec![
                        r.product_id.clone(),
                        r.product_name.clone(),
                        r.date.to_string(),
                        r.stock_level.to_string(),
                        r.reorder_point.to_string(),
                        r.supplier.clone(),
                        r.lead_time_days.to_string(),
                    ]
                })
                .collect();
            if rows.is_empty() {
                return Ok(ToolResult::success("No data found for the given filters."));
            }
            let headers = [
                "product_id",
                "product_name",
                "date",
                "stock_level",
                "reorder_point",
                "supplier",
                "lead_time_days",
            ];
            Ok(ToolResult::success(render_table(&headers, &rows)))
        })
    }
}

// ── SupplierSummaryTool ─────────────────────────────────────────

pub struct SupplierSummaryTool {
    data: Arc<SalesDataset>,
}

impl SupplierSummaryTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

impl Tool for SupplierSummaryTool {
    fn name(&self) -> &str {
        "get_supplier_summary"
    }
    fn description(&self) -> &str {
        "Get a summary of all suppliers including products supplied, average lead times, \
         and average unit costs."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }
    fn execute(
        &self,
        _input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let summaries: Vec<String> = self
                .data
                .by_supplier()
                .into_iter()
                .map(|(supplier, rows)| {
                    let mut products: Vec<&str> = Vec::new();
                    for r in &rows {
                        if !products.contains(&r.product_name.as_str()) {
                            products.push(&r.product_name);
                        }
                    }
                    let n = rows.len() as f64;
                    let avg_lead = rows.iter().map(|r| r.lead_time_days as f64).sum::<f64>() / n;
                    let avg_cost = rows.iter().map(|r| r.unit_cost).sum::<f64>() / n;
                    format!(
                        "Supplier: {}\n  Products: {}\n  Avg Lead Time: {:.1} days\n  Avg Unit Cost: ${:.2}",
                        supplier,
                        products.join(", "),
                        avg_lead,
                        avg_cost
                    )
                })
                .collect();
            if summaries.is_empty() {
                return Ok(ToolResult::success("No supplier data available."));
            }
            Ok(ToolResult::success(summaries.join("\n\n")))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scia_core::types::{RunId, UnitId};
    use scia_test_utils::SAMPLE_CSV;

    fn data() -> Arc<SalesDataset> {
        Arc::new(SalesDataset::parse(SAMPLE_CSV).unwrap())
    }

    fn ctx() -> ToolContext {
        ToolContext {
            run_id: RunId::new(),
            unit: UnitId::DemandAnalyst,
        }
    }

    #[tokio::test]
    async fn query_filters_by_supplier() {
        let tool = QuerySalesDataTool::new(data());
        let out = tool
            .execute(serde_json::json!({ "supplier": "SupplierB" }), ctx())
            .await
            .unwrap();
        assert!(!out.is_error);
        assert_eq!(out.content.lines().count(), 4);
        assert!(out.content.contains("Pepsi 12-Pack"));
        assert!(!out.content.contains("Lay's Classic"));
    }

    #[tokio::test]
    async fn query_with_no_match() {
        let tool = QuerySalesDataTool::new(data());
        let out = tool
            .execute(serde_json::json!({ "product_id": "P999" }), ctx())
            .await
            .unwrap();
        assert_eq!(out.content, "No data found for the given filters.");
    }

    #[tokio::test]
    async fn query_rejects_wrong_types() {
        let tool = QuerySalesDataTool::new(data());
        let err = tool
            .execute(serde_json::json!({ "product_id": 7 }), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, SciaError::ToolValidation(_)));
    }

    #[tokio::test]
    async fn latest_inventory_single_product() {
        let tool = LatestInventoryTool::new(data());
        let out = tool
            .execute(serde_json::json!({ "product_id": "P002" }), ctx())
            .await
            .unwrap();
        let lines: Vec<&str> = out.content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("2024-01-03"));
        assert!(lines[1].contains("SupplierB"));
    }

    #[tokio::test]
    async fn supplier_summary_averages() {
        let tool = SupplierSummaryTool::new(data());
        let out = tool.execute(serde_json::json!({}), ctx()).await.unwrap();
        assert!(out.content.starts_with("Supplier: SupplierA"));
        assert!(out.content.contains("Avg Lead Time: 5.0 days\n  Avg Unit Cost: $1.50"));
        assert!(out.content.contains("Avg Lead Time: 7.7 days\n  Avg Unit Cost: $3.27"));
    }

    #[tokio::test]
    async fn product_list() {
        let tool = ProductListTool::new(data());
        let out = tool.execute(serde_json::json!({}), ctx()).await.unwrap();
        assert_eq!(out.content.lines().count(), 3);
    }
}
