use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::EdgeScorer;
use meshwork_core::types::{GroupFeatures, NodeProfile};

const DEFAULT_DIMS: usize = 128;
const ADJACENCY_BONUS: f64 = 1.0;

/// Hashed bag-of-words scorer.
///
/// A slot's vector is its role features plus half its backend/tool
/// features. Pair score = slot affinity + both slots' task relevance, plus a
/// bonus where the role connections allow the pair.
pub struct LexicalScorer {
    dims: usize,
}

impl LexicalScorer {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dims];
        for token in tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            v[(hasher.finish() % self.dims as u64) as usize] += 1.0;
        }
        normalize(&mut v);
        v
    }
}

impl Default for LexicalScorer {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

impl EdgeScorer for LexicalScorer {
    fn features(&self, profiles: &[NodeProfile]) -> Result<GroupFeatures> {
        Ok(GroupFeatures {
            static_features: profiles
                .iter()
                .map(|p| self.embed(&format!("{} {}", p.role, p.role_description)))
                .collect(),
            dynamic_features: profiles
                .iter()
                .map(|p| self.embed(&format!("{} {}", p.llm_profile, p.tool_profile)))
                .collect(),
        })
    }

    fn score(
        &self,
        features: &GroupFeatures,
        role_adjacency: &[(usize, usize)],
        task: &str,
    ) -> Result<Vec<f64>> {
        let n = features.static_features.len();
        if features.dynamic_features.len() != n {
            return Err(MeshworkError::Config(format!(
                "feature cache has {} static and {} dynamic rows",
                n,
                features.dynamic_features.len()
            )));
        }

        let task_vec = self.embed(task);
        let slots: Vec<Vec<f32>> = features
            .static_features
            .iter()
            .zip(&features.dynamic_features)
            .map(|(s, d)| {
                let mut v: Vec<f32> = s.iter().zip(d).map(|(a, b)| a + 0.5 * b).collect();
                normalize(&mut v);
                v
            })
            .collect();
        let relevance: Vec<f64> = slots.iter().map(|v| dot(v, &task_vec)).collect();

        let mut logits = vec![0.0; n * n];
        for i in 0..n {
            for j in 0..n {
                logits[i * n + j] = dot(&slots[i], &slots[j]) + relevance[i] + relevance[j];
            }
        }
        for &(i, j) in role_adjacency {
            if i < n && j < n {
                logits[i * n + j] += ADJACENCY_BONUS;
            }
        }
        Ok(logits)
    }
}

/// Rescale to [-1, 1]. A constant input maps to zeros.
pub fn min_max_norm(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span == 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span * 2.0 - 1.0).collect()
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (*x as f64) * (*y as f64)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(role: &str, description: &str) -> NodeProfile {
        NodeProfile {
            role: role.into(),
            role_description: description.into(),
            llm_profile: "gpt-4o by OpenAI".into(),
            tool_profile: "no external tool".into(),
        }
    }

    #[test]
    fn test_min_max_norm() {
        assert_eq!(min_max_norm(&[1.0, 3.0, 2.0]), vec![-1.0, 1.0, 0.0]);
        assert_eq!(min_max_norm(&[4.0, 4.0]), vec![0.0, 0.0]);
        assert!(min_max_norm(&[]).is_empty());
    }

    #[test]
    fn test_features_shape() {
        let scorer = LexicalScorer::new(32);
        let features = scorer
            .features(&[profile("Doctor", "treats patients"), profile("Lawyer", "law")])
            .unwrap();
        assert_eq!(features.static_features.len(), 2);
        assert_eq!(features.dynamic_features[0].len(), 32);
    }

    #[test]
    fn test_score_prefers_adjacent_and_relevant_pairs() {
        let scorer = LexicalScorer::default();
        let profiles = vec![
            profile("Doctor", "medicine patients treatment disease"),
            profile("Lawyer", "contracts courts statutes"),
            profile("Economist", "markets inflation finance"),
        ];
        let features = scorer.features(&profiles).unwrap();
        let logits = scorer
            .score(&features, &[(1, 2)], "Which disease needs treatment for these patients?")
            .unwrap();
        assert_eq!(logits.len(), 9);
        // Lawyer -> Economist carries the adjacency bonus, the reverse does not
        assert!(logits[5] > logits[7]);
        // the Doctor is the most relevant slot for a medical task
        assert!(logits[0] > logits[4]);
    }

    #[test]
    fn test_score_rejects_ragged_cache() {
        let features = GroupFeatures {
            static_features: vec![vec![0.0; 4]; 2],
            dynamic_features: vec![vec![0.0; 4]],
        };
        assert!(LexicalScorer::new(4).score(&features, &[], "t").is_err());
    }
}
