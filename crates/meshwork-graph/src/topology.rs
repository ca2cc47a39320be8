//! Fixed mask presets. Masks are flattened row-major, row = source worker.

use rand::seq::SliceRandom;
use rand::Rng;

use meshwork_core::types::Topology;

/// Spatial and temporal masks for one preset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyMasks {
    pub spatial: Vec<u8>,
    pub temporal: Vec<u8>,
}

/// Masks for `n` workers. `temporal` overrides the preset used for the
/// temporal mask; it defaults to `spatial`.
pub fn masks<R: Rng + ?Sized>(
    spatial: Topology,
    temporal: Option<Topology>,
    n: usize,
    rng: &mut R,
) -> TopologyMasks {
    let spatial_mask = preset(spatial, n, rng).0;
    let temporal_mask = preset(temporal.unwrap_or(spatial), n, rng).1;
    TopologyMasks {
        spatial: flatten(spatial_mask),
        temporal: flatten(temporal_mask),
    }
}

type Matrix = Vec<Vec<u8>>;

fn preset<R: Rng + ?Sized>(topology: Topology, n: usize, rng: &mut R) -> (Matrix, Matrix) {
    let ones = || vec![vec![1u8; n]; n];
    let zeros = || vec![vec![0u8; n]; n];
    let build = |f: &dyn Fn(usize, usize) -> bool| -> Matrix {
        (0..n)
            .map(|i| (0..n).map(|j| u8::from(f(i, j))).collect())
            .collect()
    };

    match topology {
        Topology::FullConnected => (build(&|i, j| i != j), ones()),
        Topology::Random => {
            let spatial = (0..n)
                .map(|i| (0..n).map(|j| u8::from(i != j && rng.gen_bool(0.5))).collect())
                .collect();
            let temporal = (0..n)
                .map(|_| (0..n).map(|_| u8::from(rng.gen_bool(0.5))).collect())
                .collect();
            (spatial, temporal)
        }
        Topology::Chain => (
            build(&|i, j| j == i + 1),
            build(&|i, j| n > 1 && i == n - 1 && j == 0),
        ),
        Topology::Debate => (zeros(), ones()),
        Topology::Layered => {
            let layer_of = layers(n, 2, rng);
            (build(&|i, j| layer_of[j] == layer_of[i] + 1), ones())
        }
        Topology::Mesh => (build(&|i, j| i < j), ones()),
        Topology::Star => (build(&|i, j| i == 0 && j != 0), ones()),
        Topology::DirectAnswer => (zeros(), zeros()),
    }
}

/// Random layer index per worker, every layer non-empty when `n >= layers`.
fn layers<R: Rng + ?Sized>(n: usize, count: usize, rng: &mut R) -> Vec<usize> {
    let mut assignment: Vec<usize> = (0..n).map(|i| i % count.max(1)).collect();
    assignment.shuffle(rng);
    assignment
}

fn flatten(matrix: Matrix) -> Vec<u8> {
    matrix.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_full_connected_defaults() {
        let m = masks(Topology::FullConnected, None, 3, &mut rng());
        assert_eq!(m.spatial, vec![0, 1, 1, 1, 0, 1, 1, 1, 0]);
        assert_eq!(m.temporal, vec![1; 9]);
    }

    #[test]
    fn test_chain() {
        let m = masks(Topology::Chain, None, 3, &mut rng());
        assert_eq!(m.spatial, vec![0, 1, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(m.temporal, vec![0, 0, 0, 0, 0, 0, 1, 0, 0]);
    }

    #[test]
    fn test_star_and_mesh() {
        let star = masks(Topology::Star, None, 3, &mut rng());
        assert_eq!(star.spatial, vec![0, 1, 1, 0, 0, 0, 0, 0, 0]);
        let mesh = masks(Topology::Mesh, None, 3, &mut rng());
        assert_eq!(mesh.spatial, vec![0, 1, 1, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_layered_only_points_forward() {
        let m = masks(Topology::Layered, None, 4, &mut rng());
        for i in 0..4 {
            assert_eq!(m.spatial[i * 4 + i], 0);
            for j in 0..4 {
                if m.spatial[i * 4 + j] == 1 {
                    assert_eq!(m.spatial[j * 4 + i], 0);
                }
            }
        }
        assert_eq!(m.spatial.iter().filter(|&&v| v == 1).count(), 4);
    }

    #[test]
    fn test_temporal_override_and_random_diagonal() {
        let m = masks(Topology::Random, Some(Topology::DirectAnswer), 4, &mut rng());
        assert_eq!(m.temporal, vec![0; 16]);
        for i in 0..4 {
            assert_eq!(m.spatial[i * 4 + i], 0);
        }
        let debate = masks(Topology::Debate, None, 2, &mut rng());
        assert_eq!(debate.spatial, vec![0; 4]);
        assert_eq!(debate.temporal, vec![1; 4]);
    }
}
