pub mod graph;
pub mod pipeline;
pub mod specialist;

pub use graph::{ExecutionResult, GraphExecutor, RunState, Stage, StateUpdate};
pub use pipeline::{Answer, Pipeline};
pub use specialist::{system_prompt, LlmSpecialist, Specialists};
