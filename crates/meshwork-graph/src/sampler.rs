use rand::Rng;
use tracing::debug;

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::EdgeKind;

use crate::edge::{EdgeState, PotentialEdge};
use crate::node::NodeArena;

/// Realizes concrete edges from potential edges, logits and masks.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSampler {
    temperature: f64,
    threshold: Option<f64>,
}

impl EdgeSampler {
    pub fn new(temperature: f64, threshold: Option<f64>) -> Result<Self> {
        if temperature < 1.0 {
            return Err(MeshworkError::Config(format!(
                "sampling temperature must be >= 1.0, got {}",
                temperature
            )));
        }
        Ok(Self {
            temperature,
            threshold,
        })
    }

    /// Inclusion probability for a learned edge.
    pub fn edge_probability(&self, logit: f64) -> f64 {
        let p = sigmoid(logit / self.temperature);
        match self.threshold {
            Some(t) if p > t => 1.0,
            Some(_) => 0.0,
            None => p,
        }
    }

    /// Clear edges of `state.kind()` and draw a fresh realization.
    /// Returns the summed log-probability of the learned draws.
    pub fn realize<R: Rng + ?Sized>(
        &self,
        arena: &mut NodeArena,
        edges: &[PotentialEdge],
        state: &EdgeState,
        rng: &mut R,
    ) -> Result<f64> {
        let kind = state.kind();
        if edges.len() != state.len() {
            return Err(MeshworkError::MaskLength {
                kind,
                expected: edges.len(),
                actual: state.len(),
            });
        }
        arena.clear_connections(kind);

        let mut log_prob = 0.0;
        let mut realized = 0usize;
        for ((edge, &mask), &logit) in edges.iter().zip(state.masks()).zip(state.logits()) {
            if mask == 0 {
                continue;
            }
            let from = arena.find(&edge.source)?;
            let to = arena.find(&edge.dest)?;
            if arena.would_create_cycle(from, to, kind) {
                continue;
            }
            if !state.is_optimized() {
                arena.add_successor(from, to, kind);
                realized += 1;
                continue;
            }

            let p = self.edge_probability(logit);
            if rng.gen::<f64>() < p {
                arena.add_successor(from, to, kind);
                realized += 1;
                log_prob += p.ln();
            } else {
                log_prob += (1.0 - p).ln();
            }
        }

        debug!(kind = %kind, realized, log_prob, "Realized edges");
        Ok(log_prob)
    }

    /// Temporal realization; round 0 has no previous round to link to.
    pub fn realize_temporal<R: Rng + ?Sized>(
        &self,
        round: usize,
        arena: &mut NodeArena,
        edges: &[PotentialEdge],
        state: &EdgeState,
        rng: &mut R,
    ) -> Result<f64> {
        if round == 0 {
            arena.clear_connections(EdgeKind::Temporal);
            return Ok(0.0);
        }
        self.realize(arena, edges, state, rng)
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
