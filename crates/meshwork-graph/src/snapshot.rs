use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::EdgeKind;

/// Pruned masks persisted between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskSnapshot {
    pub agents: usize,
    pub spatial: Vec<u8>,
    pub temporal: Vec<u8>,
    /// Prune passes applied so far.
    #[serde(default)]
    pub prunes: usize,
}

impl MaskSnapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: MaskSnapshot = serde_json::from_str(&content)?;
        Ok(snapshot)
    }

    /// Load if the file exists.
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!(path = %path.display(), prunes = self.prunes, "Saved mask snapshot");
        Ok(())
    }

    /// Reject a snapshot taken for a different worker count.
    pub fn check(&self, agents: usize) -> Result<()> {
        if self.agents != agents {
            return Err(MeshworkError::Config(format!(
                "mask snapshot is for {} agents, graph has {}",
                self.agents, agents
            )));
        }
        let expected = agents * agents;
        for (kind, mask) in [
            (EdgeKind::Spatial, &self.spatial),
            (EdgeKind::Temporal, &self.temporal),
        ] {
            if mask.len() != expected {
                return Err(MeshworkError::MaskLength {
                    kind,
                    expected,
                    actual: mask.len(),
                });
            }
        }
        Ok(())
    }

    pub fn open_edges(&self, kind: EdgeKind) -> usize {
        let mask = match kind {
            EdgeKind::Spatial => &self.spatial,
            EdgeKind::Temporal => &self.temporal,
        };
        mask.iter().filter(|&&m| m == 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("masks/latest.json");
        let snapshot = MaskSnapshot {
            agents: 2,
            spatial: vec![0, 1, 0, 0],
            temporal: vec![1, 1, 1, 0],
            prunes: 3,
        };
        snapshot.save(&path).unwrap();
        let loaded = MaskSnapshot::load(&path).unwrap();
        assert_eq!(loaded.prunes, 3);
        assert_eq!(loaded.open_edges(EdgeKind::Temporal), 3);
        assert!(MaskSnapshot::load_optional(&dir.path().join("none.json")).unwrap().is_none());
    }

    #[test]
    fn test_check_catches_mismatch() {
        let snapshot = MaskSnapshot {
            agents: 2,
            spatial: vec![1; 4],
            temporal: vec![1; 3],
            prunes: 0,
        };
        assert!(snapshot.check(3).is_err());
        assert!(matches!(
            snapshot.check(2),
            Err(MeshworkError::MaskLength { kind: EdgeKind::Temporal, .. })
        ));
    }
}
