use serde::Serialize;
use tracing::{debug, info};

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::EdgeKind;

use crate::edge::EdgeState;

/// What one prune pass did to one edge kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PruneOutcome {
    pub kind: EdgeKind,
    pub pruned: usize,
    pub remaining: usize,
    /// True when the kind is static or had nothing left to prune.
    pub skipped: bool,
}

/// Permanently closes the lowest-logit open edges.
#[derive(Debug, Clone, Copy)]
pub struct MaskPruner {
    rate: f64,
}

impl MaskPruner {
    pub fn new(rate: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(MeshworkError::Config(format!(
                "pruning rate must lie in [0, 1], got {}",
                rate
            )));
        }
        Ok(Self { rate })
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Number of edges a pass closes when `open` edges are still open.
    pub fn target(&self, open: usize) -> usize {
        if open == 0 {
            return 0;
        }
        ((open as f64 * self.rate).round() as usize).clamp(1, open)
    }

    /// Close `target(E)` more edges. Already-masked edges rank below every
    /// open edge so they fill the bottom of the cut and stay closed.
    pub fn prune(&self, state: &mut EdgeState) -> PruneOutcome {
        let kind = state.kind();
        let open = state.open_count();
        if !state.is_optimized() || open == 0 {
            debug!(kind = %kind, open, "Prune skipped");
            return PruneOutcome {
                kind,
                pruned: 0,
                remaining: open,
                skipped: true,
            };
        }

        let masked = state.masked_count();
        let target = self.target(open);

        // masked edges sort first whatever their logits
        let mut ranked: Vec<(bool, f64, usize)> = state
            .logits()
            .iter()
            .zip(state.masks())
            .enumerate()
            .map(|(i, (&logit, &mask))| (mask == 1, logit, i))
            .collect();
        ranked.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then(a.1.total_cmp(&b.1))
                .then(a.2.cmp(&b.2))
        });

        let masks = state.masks_mut();
        for &(_, _, i) in ranked.iter().take(target + masked) {
            masks[i] = 0;
        }

        let remaining = state.open_count();
        info!(kind = %kind, pruned = target, remaining, "Pruned edges");
        PruneOutcome {
            kind,
            pruned: target,
            remaining,
            skipped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(masks: Vec<u8>, logits: Vec<f64>, optimized: bool) -> EdgeState {
        let n = (masks.len() as f64).sqrt() as usize;
        let mut s = EdgeState::new(EdgeKind::Spatial, n, masks, optimized, 0.5).unwrap();
        s.set_logits(logits).unwrap();
        s
    }

    #[test]
    fn test_rate_is_validated() {
        assert!(MaskPruner::new(1.5).is_err());
        assert!(MaskPruner::new(-0.1).is_err());
        assert!(MaskPruner::new(0.0).is_ok());
    }

    #[test]
    fn test_target_never_zero_while_edges_remain() {
        let p = MaskPruner::new(0.0).unwrap();
        assert_eq!(p.target(5), 1);
        assert_eq!(p.target(0), 0);
        let p = MaskPruner::new(0.25).unwrap();
        assert_eq!(p.target(6), 2);
        assert_eq!(MaskPruner::new(1.0).unwrap().target(4), 4);
    }

    #[test]
    fn test_prunes_lowest_logits() {
        let mut s = state(
            vec![1, 1, 1, 1, 1, 1, 1, 1, 1],
            vec![0.9, 0.1, 0.5, -0.3, 0.8, 0.2, 0.7, 0.6, 0.4],
            true,
        );
        let out = MaskPruner::new(0.25).unwrap().prune(&mut s);
        // round(9 * 0.25) = 2
        assert_eq!(out.pruned, 2);
        assert_eq!(out.remaining, 7);
        assert_eq!(s.masks()[3], 0);
        assert_eq!(s.masks()[1], 0);
    }

    #[test]
    fn test_masked_edges_stay_masked_and_count_exactly() {
        // masked edge 0 has the highest logit; it must not be reopened
        let mut s = state(vec![0, 1, 1, 1], vec![5.0, 0.3, 0.1, 0.2], true);
        let out = MaskPruner::new(0.5).unwrap().prune(&mut s);
        assert_eq!(out.remaining, 3 - 2);
        assert_eq!(s.masks(), &[0, 1, 0, 0]);
    }

    #[test]
    fn test_extreme_logits_keep_exact_count() {
        for logit in [f64::NEG_INFINITY, -1e17] {
            let masks = vec![0, 1, 1, 1, 0, 1, 1, 1, 0];
            let mut s = state(masks, vec![logit; 9], true);
            let out = MaskPruner::new(0.5).unwrap().prune(&mut s);
            assert_eq!(out.pruned, 3);
            assert_eq!(out.remaining, 3);
            assert_eq!(s.open_count(), 3);
            for diagonal in [0, 4, 8] {
                assert_eq!(s.masks()[diagonal], 0);
            }
        }
    }

    #[test]
    fn test_masked_edges_never_outrank_open_ones() {
        let mut s = state(
            vec![0, 1, 1, 1],
            vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 2.0, -3.0],
            true,
        );
        let out = MaskPruner::new(0.34).unwrap().prune(&mut s);
        assert_eq!(out.remaining, 2);
        assert_eq!(s.masks(), &[0, 0, 1, 1]);
    }

    #[test]
    fn test_repeated_pruning_is_monotonic() {
        let logits: Vec<f64> = (0..16).map(|i| ((i * 7) % 16) as f64 / 10.0).collect();
        let mut s = state(vec![1; 16], logits, true);
        let pruner = MaskPruner::new(0.3).unwrap();
        let mut previous = s.masks().to_vec();
        while s.open_count() > 0 {
            let open = s.open_count();
            let out = pruner.prune(&mut s);
            assert_eq!(s.open_count(), open - pruner.target(open));
            assert!(!out.skipped);
            for (before, after) in previous.iter().zip(s.masks()) {
                assert!(*after <= *before);
            }
            previous = s.masks().to_vec();
        }
        assert!(pruner.prune(&mut s).skipped);
    }

    #[test]
    fn test_static_kind_untouched() {
        let mut s = state(vec![1; 4], vec![0.0; 4], false);
        let out = MaskPruner::new(0.5).unwrap().prune(&mut s);
        assert!(out.skipped);
        assert_eq!(s.masks(), &[1, 1, 1, 1]);
    }
}
