use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Deserialize;

use scia_core::error::{Result, SciaError};
use scia_core::traits::Tool;
use scia_core::types::{ToolContext, ToolResult};

use crate::dataset::SalesDataset;

/// Direction of recent demand relative to the start of the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    /// More than 5% above the baseline is up, more than 5% below is down.
    pub fn classify(recent_avg: f64, earlier_avg: f64) -> Self {
        if recent_avg > earlier_avg * 1.05 {
            Trend::Up
        } else if recent_avg < earlier_avg * 0.95 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Up => "up",
            Trend::Down => "down",
            Trend::Stable => "stable",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockRisk {
    Critical,
    Warning,
    Healthy,
}

impl StockRisk {
    pub fn classify(stock: i64, reorder_point: i64) -> Self {
        if stock <= 0 {
            StockRisk::Critical
        } else if stock < reorder_point {
            StockRisk::Warning
        } else {
            StockRisk::Healthy
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockRisk::Critical => "critical",
            StockRisk::Warning => "warning",
            StockRisk::Healthy => "healthy",
        }
    }
}

fn mean(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<u64>() as f64 / values.len() as f64
}

// ── ForecastDemandTool ──────────────────────────────────────────

pub struct ForecastDemandTool {
    data: Arc<SalesDataset>,
}

impl ForecastDemandTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

#[derive(Deserialize)]
struct ForecastInput {
    product_id: String,
    #[serde(default = "default_window")]
    window: usize,
}

fn default_window() -> usize {
    7
}

impl Tool for ForecastDemandTool {
    fn name(&self) -> &str {
        "forecast_demand"
    }
    fn description(&self) -> &str {
        "Forecast demand for a product using a moving average over the given window \
         (default 7 days). Returns current average daily sales, 7-day forecast, and trend direction."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "Product ID such as P001" },
                "window": { "type": "integer", "description": "Days in the moving average (default 7)", "default": 7 }
            },
            "required": ["product_id"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: ForecastInput = serde_json::from_value(input)
                .map_err(|e| SciaError::ToolValidation(e.to_string()))?;
            if p.window == 0 {
                return Err(SciaError::ToolValidation("'window' must be at least 1".into()));
            }

            let history = self.data.history(&p.product_id);
            let Some(first) = history.first() else {
                return Ok(ToolResult::success(format!(
                    "No data found for product {}.",
                    p.product_id
                )));
            };

            let sales: Vec<u64> = history.iter().map(|r| r.quantity_sold).collect();
            let take = p.window.min(sales.len());
            let recent_avg = mean(&sales[sales.len() - take..]);
            let earlier_avg = mean(&sales[..take]);
            let trend = Trend::classify(recent_avg, earlier_avg);

            Ok(ToolResult::success(format!(
                "Product: {} ({})\n\
                 Avg Daily Sales (last {w} days): {:.1} units\n\
                 Avg Daily Sales (first {w} days): {:.1} units\n\
                 7-Day Forecast: {:.0} units\n\
                 Trend: {}",
                first.product_name,
                p.product_id,
                recent_avg,
                earlier_avg,
                recent_avg * 7.0,
                trend.as_str(),
                w = p.window,
            )))
        })
    }
}

// ── DaysOfSupplyTool ────────────────────────────────────────────

pub struct DaysOfSupplyTool {
    data: Arc<SalesDataset>,
}

impl DaysOfSupplyTool {
    pub fn new(data: Arc<SalesDataset>) -> Self {
        Self { data }
    }
}

#[derive(Deserialize)]
struct SupplyInput {
    product_id: String,
}

impl Tool for DaysOfSupplyTool {
    fn name(&self) -> &str {
        "calculate_days_of_supply"
    }
    fn description(&self) -> &str {
        "Calculate days of supply remaining for a product based on current stock and recent sales rate."
    }
    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "description": "Product ID such as P001" }
            },
            "required": ["product_id"]
        })
    }
    fn execute(
        &self,
        input: serde_json::Value,
        _ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>> {
        Box::pin(async move {
            let p: SupplyInput = serde_json::from_value(input)
                .map_err(|e| SciaError::ToolValidation(e.to_string()))?;

            let history = self.data.history(&p.product_id);
            let Some(latest) = history.last() else {
                return Ok(ToolResult::success(format!(
                    "No data found for product {}.",
                    p.product_id
                )));
            };

            let sales: Vec<u64> = history.iter().map(|r| r.quantity_sold).collect();
            let avg_daily = mean(&sales[sales.len().saturating_sub(7)..]);
            let days = if avg_daily > 0.0 {
                latest.stock_level as f64 / avg_daily
            } else {
                f64::INFINITY
            };
            let risk = StockRisk::classify(latest.stock_level, latest.reorder_point);

            Ok(ToolResult::success(format!(
                "Product: {} ({})\n\
                 Current Stock: {} units\n\
                 Reorder Point: {} units\n\
                 Avg Daily Sales (7d): {:.1} units\n\
                 Days of Supply: {:.1} days\n\
                 Risk Level: {}",
                latest.product_name,
                p.product_id,
                latest.stock_level,
                latest.reorder_point,
                avg_daily,
                days,
                risk.as_str(),
            )))
        })
    }
}
