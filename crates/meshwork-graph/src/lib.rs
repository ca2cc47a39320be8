//! Dynamic agent-graph engine.
//!
//! Every run picks a configuration group, rebuilds the worker nodes,
//! samples spatial and temporal edges from logits and masks, schedules the
//! workers round by round, and ends with one decision-node execution.
//! Between runs the masks can be pruned and persisted.

pub mod decision;
pub mod edge;
pub mod graph;
pub mod groups;
pub mod journal;
pub mod node;
pub mod prompt;
pub mod pruner;
pub mod registry;
pub mod sampler;
pub mod scheduler;
pub mod scorer;
pub mod snapshot;
pub mod topology;

pub use edge::{EdgeState, PotentialEdge};
pub use graph::{Graph, GraphBuilder};
pub use groups::{ConfigurationGroup, ConfigurationGroups};
pub use journal::RunJournal;
pub use node::{AgentNode, NodeArena};
pub use prompt::PromptReasoner;
pub use pruner::{MaskPruner, PruneOutcome};
pub use registry::{PromptSet, PromptSetRegistry, ToolRegistry};
pub use sampler::EdgeSampler;
pub use scheduler::{ExecutionMode, RunOptions};
pub use scorer::LexicalScorer;
pub use snapshot::MaskSnapshot;
