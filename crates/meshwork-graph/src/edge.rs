use serde::{Deserialize, Serialize};

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::EdgeKind;

/// Logit used for every edge of a kind that is not being optimized.
pub const STATIC_LOGIT: f64 = 10.0;

/// A candidate `(source, dest)` worker pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotentialEdge {
    pub source: String,
    pub dest: String,
}

/// Full worker × worker cross product, row-major, self-pairs included.
pub fn potential_edges(ids: &[String]) -> Vec<PotentialEdge> {
    ids.iter()
        .flat_map(|source| {
            ids.iter().map(move |dest| PotentialEdge {
                source: source.clone(),
                dest: dest.clone(),
            })
        })
        .collect()
}

/// Starting logit for an edge kind.
pub fn initial_logit(optimized: bool, probability: f64) -> f64 {
    if optimized {
        (probability / (1.0 - probability)).ln()
    } else {
        STATIC_LOGIT
    }
}

/// Logits and masks for one edge kind, flattened row-major over N×N.
///
/// Logits are plain numbers an external optimizer may rewrite between runs.
/// Masks only ever move from 1 to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeState {
    kind: EdgeKind,
    nodes: usize,
    logits: Vec<f64>,
    masks: Vec<u8>,
    optimized: bool,
}

impl EdgeState {
    pub fn new(
        kind: EdgeKind,
        nodes: usize,
        masks: Vec<u8>,
        optimized: bool,
        initial_probability: f64,
    ) -> Result<Self> {
        check_len(kind, nodes, masks.len())?;
        if let Some(bad) = masks.iter().find(|&&m| m > 1) {
            return Err(MeshworkError::Config(format!(
                "{} mask entries must be 0 or 1, found {}",
                kind, bad
            )));
        }
        let logit = initial_logit(optimized, initial_probability);
        Ok(Self {
            kind,
            nodes,
            logits: vec![logit; nodes * nodes],
            masks,
            optimized,
        })
    }

    pub fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Worker count N.
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn is_optimized(&self) -> bool {
        self.optimized
    }

    pub fn logits(&self) -> &[f64] {
        &self.logits
    }

    pub fn logits_mut(&mut self) -> &mut [f64] {
        &mut self.logits
    }

    pub fn set_logits(&mut self, logits: Vec<f64>) -> Result<()> {
        if logits.len() != self.logits.len() {
            return Err(MeshworkError::Config(format!(
                "{} logits have {} entries, expected {}",
                self.kind,
                logits.len(),
                self.logits.len()
            )));
        }
        self.logits = logits;
        Ok(())
    }

    pub fn masks(&self) -> &[u8] {
        &self.masks
    }

    pub(crate) fn masks_mut(&mut self) -> &mut [u8] {
        &mut self.masks
    }

    pub fn open_count(&self) -> usize {
        self.masks.iter().filter(|&&m| m == 1).count()
    }

    pub fn masked_count(&self) -> usize {
        self.masks.len() - self.open_count()
    }

    /// Intersect with a persisted mask; a persisted 0 always wins.
    pub fn restrict(&mut self, persisted: &[u8]) -> Result<()> {
        check_len(self.kind, self.nodes, persisted.len())?;
        for (mask, &keep) in self.masks.iter_mut().zip(persisted) {
            if keep == 0 {
                *mask = 0;
            }
        }
        Ok(())
    }
}

fn check_len(kind: EdgeKind, nodes: usize, actual: usize) -> Result<()> {
    let expected = nodes * nodes;
    if actual != expected {
        return Err(MeshworkError::MaskLength {
            kind,
            expected,
            actual,
        });
    }
    Ok(())
}
