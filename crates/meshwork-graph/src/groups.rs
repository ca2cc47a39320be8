use std::collections::BTreeMap;
use std::path::Path;

use rand::seq::IteratorRandom;
use rand::Rng;
use tracing::{debug, info};

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::{GroupFeatures, SlotConfig};

/// Name of the group built when no node configuration file is given.
pub const DEFAULT_GROUP: &str = "default";

/// A named per-slot assignment plus its cached scorer features.
#[derive(Debug, Clone)]
pub struct ConfigurationGroup {
    pub name: String,
    pub slots: Vec<SlotConfig>,
    pub features: Option<GroupFeatures>,
}

/// Read-only cache of configuration groups, keyed by name.
#[derive(Debug, Clone)]
pub struct ConfigurationGroups {
    agents: usize,
    groups: BTreeMap<String, ConfigurationGroup>,
}

impl ConfigurationGroups {
    /// Every group must hold exactly `agents` slots.
    pub fn from_map(agents: usize, map: BTreeMap<String, Vec<SlotConfig>>) -> Result<Self> {
        if map.is_empty() {
            return Err(MeshworkError::NoGroups);
        }
        let mut groups = BTreeMap::new();
        for (name, slots) in map {
            if slots.len() != agents {
                return Err(MeshworkError::GroupSize {
                    group: name,
                    expected: agents,
                    actual: slots.len(),
                });
            }
            groups.insert(
                name.clone(),
                ConfigurationGroup {
                    name,
                    slots,
                    features: None,
                },
            );
        }
        info!(groups = groups.len(), agents, "Loaded configuration groups");
        Ok(Self { agents, groups })
    }

    /// Load `{group_name: [slot, ...]}` from a JSON file.
    pub fn load(path: &Path, agents: usize) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| MeshworkError::ConfigNotFound(path.display().to_string()))?;
        let map: BTreeMap<String, Vec<SlotConfig>> = serde_json::from_str(&content)
            .map_err(|e| MeshworkError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_map(agents, map)
    }

    /// One group holding the given roles.
    pub fn single(roles: Vec<String>) -> Self {
        let agents = roles.len();
        let slots = roles.into_iter().map(SlotConfig::new).collect();
        let mut groups = BTreeMap::new();
        groups.insert(
            DEFAULT_GROUP.to_string(),
            ConfigurationGroup {
                name: DEFAULT_GROUP.to_string(),
                slots,
                features: None,
            },
        );
        Self { agents, groups }
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigurationGroup> {
        self.groups.values()
    }

    pub fn get(&self, name: &str) -> Result<&ConfigurationGroup> {
        self.groups
            .get(name)
            .ok_or_else(|| MeshworkError::UnknownGroup(name.to_string()))
    }

    /// Explicit name wins; otherwise one uniform pick.
    pub fn select<R: Rng + ?Sized>(
        &self,
        fixed: Option<&str>,
        rng: &mut R,
    ) -> Result<&ConfigurationGroup> {
        let group = match fixed {
            Some(name) => self.get(name)?,
            None => self.groups.values().choose(rng).ok_or(MeshworkError::NoGroups)?,
        };
        debug!(group = %group.name, fixed = fixed.is_some(), "Selected configuration group");
        Ok(group)
    }

    /// Fill every group's feature cache. Only called while building the graph.
    pub(crate) fn cache_features(
        &mut self,
        mut compute: impl FnMut(&ConfigurationGroup) -> Result<GroupFeatures>,
    ) -> Result<()> {
        for group in self.groups.values_mut() {
            let features = compute(group)?;
            group.features = Some(features);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshwork_test_utils::{temp_file, two_group_nodes_json};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_load_two_groups() {
        let file = temp_file(".json", &two_group_nodes_json().to_string());
        let groups = ConfigurationGroups::load(file.path(), 3).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.names().collect::<Vec<_>>(), vec!["group_1", "group_2"]);
        let g2 = groups.get("group_2").unwrap();
        assert_eq!(g2.slots[0].external_tool.as_ref().unwrap().source, "Arxiv");
    }

    #[test]
    fn test_group_size_mismatch_is_fatal() {
        let file = temp_file(".json", &two_group_nodes_json().to_string());
        let err = ConfigurationGroups::load(file.path(), 4).unwrap_err();
        assert!(matches!(
            err,
            MeshworkError::GroupSize { expected: 4, actual: 3, .. }
        ));
    }

    #[test]
    fn test_empty_and_missing_files() {
        assert!(matches!(
            ConfigurationGroups::from_map(2, BTreeMap::new()),
            Err(MeshworkError::NoGroups)
        ));
        assert!(matches!(
            ConfigurationGroups::load(Path::new("/nonexistent/nodes.json"), 2),
            Err(MeshworkError::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_select_prefers_fixed_group() {
        let file = temp_file(".json", &two_group_nodes_json().to_string());
        let groups = ConfigurationGroups::load(file.path(), 3).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            assert_eq!(groups.select(Some("group_2"), &mut rng).unwrap().name, "group_2");
        }
        assert!(matches!(
            groups.select(Some("group_9"), &mut rng),
            Err(MeshworkError::UnknownGroup(_))
        ));
    }

    #[test]
    fn test_random_select_covers_groups() {
        let file = temp_file(".json", &two_group_nodes_json().to_string());
        let groups = ConfigurationGroups::load(file.path(), 3).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            seen.insert(groups.select(None, &mut rng).unwrap().name.clone());
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_single_default_group() {
        let groups = ConfigurationGroups::single(vec!["Critic".into(), "Doctor".into()]);
        assert_eq!(groups.agents(), 2);
        assert_eq!(groups.get(DEFAULT_GROUP).unwrap().slots[1].role, "Doctor");
    }
}
