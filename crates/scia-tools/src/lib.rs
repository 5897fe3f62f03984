pub mod builtin;
pub mod dataset;
pub mod registry;

pub use dataset::{SalesDataset, SalesRecord};
pub use registry::ToolRegistry;
