pub mod forecast;
pub mod sales;
pub mod web_search;

pub use forecast::{DaysOfSupplyTool, ForecastDemandTool};
pub use sales::{LatestInventoryTool, ProductListTool, QuerySalesDataTool, SupplierSummaryTool};
pub use web_search::WebSearchTool;
