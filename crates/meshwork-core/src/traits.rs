use futures::future::BoxFuture;

use crate::config::ModelConfig;
use crate::error::Result;
use crate::types::*;

/// Reasoning collaborator: turns one node's inputs into text.
///
/// Failures are recoverable from the graph's point of view: the scheduler
/// retries them up to the configured budget.
pub trait Reasoner: Send + Sync + 'static {
    fn generate(&self, request: ReasoningRequest) -> BoxFuture<'_, Result<String>>;
}

/// LLM client: single chat completion against a reasoning backend.
pub trait LlmClient: Send + Sync + 'static {
    fn chat(
        &self,
        config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>>;
}

/// Scoring collaborator: produces edge logits for a configuration group.
pub trait EdgeScorer: Send + Sync + 'static {
    /// Precompute per-slot features. Called once per group at construction.
    fn features(&self, profiles: &[NodeProfile]) -> Result<GroupFeatures>;

    /// Flattened N×N spatial logits (row = source slot, column = destination).
    ///
    /// `role_adjacency` lists the `(source, destination)` slot pairs the
    /// prompt set's role connections allow.
    fn score(
        &self,
        features: &GroupFeatures,
        role_adjacency: &[(usize, usize)],
        task: &str,
    ) -> Result<Vec<f64>>;
}
