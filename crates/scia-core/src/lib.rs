pub mod config;
pub mod error;
pub mod event;
pub mod guardrail;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, SciaError};
pub use event::EventBus;
pub use types::*;
