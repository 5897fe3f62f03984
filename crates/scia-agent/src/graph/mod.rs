//! The orchestration graph.
//!
//! A fixed, acyclic graph over a per-run [`RunState`]: the router picks the
//! specialist units, the dispatcher runs them (sequentially or as concurrent
//! tasks) and merges their outputs, the synthesizer writes the final report.
//! Nodes return partial [`StateUpdate`]s; the [`GraphExecutor`] applies them.

pub mod dispatch;
pub mod edge;
pub mod executor;
pub mod node;
pub mod router;
pub mod state;
pub mod synthesizer;

pub use dispatch::Dispatcher;
pub use edge::{conditional_targets, Stage};
pub use executor::{ExecutionResult, GraphExecutor, NodeResult};
pub use node::{GraphNode, ModelCall};
pub use router::{parse_selection, router_prompt, Router};
pub use state::{RunState, StateUpdate};
pub use synthesizer::{report_sections, Synthesizer, SYNTHESIS_PROMPT};
