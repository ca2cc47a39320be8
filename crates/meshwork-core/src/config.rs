use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MeshworkError, Result};
use crate::types::Topology;

/// Top-level meshwork configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub graph: GraphConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub prune: PruneConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub journal: Option<JournalConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Number of worker slots (N).
    #[serde(default = "default_agents")]
    pub agents: usize,
    /// Prompt set key.
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default)]
    pub spatial_topology: Topology,
    /// Temporal preset; defaults to the spatial one.
    #[serde(default)]
    pub temporal_topology: Option<Topology>,
    #[serde(default)]
    pub optimized_spatial: bool,
    #[serde(default)]
    pub optimized_temporal: bool,
    #[serde(default = "default_initial_probability")]
    pub initial_spatial_probability: f64,
    #[serde(default = "default_initial_probability")]
    pub initial_temporal_probability: f64,
    /// JSON file mapping group name to per-slot configs.
    #[serde(default)]
    pub node_config_file: Option<String>,
    #[serde(default = "default_allow_random_combination")]
    pub allow_random_combination: bool,
    #[serde(default)]
    pub fixed_group: Option<String>,
    /// Where the pruned mask snapshot lives between runs.
    #[serde(default)]
    pub mask_file: Option<String>,
    /// Seed for edge sampling and group selection. Unset = entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            agents: default_agents(),
            domain: default_domain(),
            spatial_topology: Topology::default(),
            temporal_topology: None,
            optimized_spatial: false,
            optimized_temporal: false,
            initial_spatial_probability: default_initial_probability(),
            initial_temporal_probability: default_initial_probability(),
            node_config_file: None,
            allow_random_combination: default_allow_random_combination(),
            fixed_group: None,
            mask_file: None,
            seed: None,
        }
    }
}

fn default_agents() -> usize { 5 }
fn default_domain() -> String { "qa".to_string() }
fn default_initial_probability() -> f64 { 0.5 }
fn default_allow_random_combination() -> bool { true }

/// How the decision node's single execution is guarded.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Same retry budget and timeout as workers; failures fall back to the sentinel answer.
    #[default]
    Retry,
    /// One unguarded attempt; an error propagates to the caller.
    SingleAttempt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_num_rounds")]
    pub num_rounds: usize,
    #[serde(default = "default_max_tries")]
    pub max_tries: usize,
    #[serde(default = "default_max_time_secs")]
    pub max_time_secs: u64,
    /// Sampling temperature, must be >= 1.0.
    #[serde(default = "default_temperature_run")]
    pub temperature: f64,
    /// Collapse learned edge probabilities to 0/1 around this value.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub decision_policy: DecisionPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            num_rounds: default_num_rounds(),
            max_tries: default_max_tries(),
            max_time_secs: default_max_time_secs(),
            temperature: default_temperature_run(),
            threshold: None,
            decision_policy: DecisionPolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_secs)
    }
}

fn default_num_rounds() -> usize { 1 }
fn default_max_tries() -> usize { 3 }
fn default_max_time_secs() -> u64 { 600 }
fn default_temperature_run() -> f64 { 1.0 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneConfig {
    #[serde(default = "default_pruning_rate")]
    pub rate: f64,
    /// Prune after every `every` runs in batch mode.
    #[serde(default = "default_prune_every")]
    pub every: usize,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self {
            rate: default_pruning_rate(),
            every: default_prune_every(),
        }
    }
}

fn default_pruning_rate() -> f64 { 0.25 }
fn default_prune_every() -> usize { 5 }

/// JSONL run journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Enable the journal (default: true when section is present).
    #[serde(default = "default_journal_enabled")]
    pub enabled: bool,
    #[serde(default = "default_journal_dir")]
    pub dir: String,
}

fn default_journal_enabled() -> bool { true }
fn default_journal_dir() -> String { "runs".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_temperature() -> f32 { 0.0 }

/// Retry configuration for LLM requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| MeshworkError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| MeshworkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could honour.
    pub fn validate(&self) -> Result<()> {
        let g = &self.graph;
        if g.agents == 0 {
            return Err(MeshworkError::Config("graph.agents must be at least 1".into()));
        }
        for (name, p) in [
            ("initial_spatial_probability", g.initial_spatial_probability),
            ("initial_temporal_probability", g.initial_temporal_probability),
        ] {
            if !(p > 0.0 && p < 1.0) {
                return Err(MeshworkError::Config(format!(
                    "graph.{} must lie strictly between 0 and 1, got {}",
                    name, p
                )));
            }
        }
        if !g.allow_random_combination && g.fixed_group.is_none() {
            return Err(MeshworkError::Config(
                "graph.fixed_group is required when allow_random_combination = false".into(),
            ));
        }
        if self.run.temperature < 1.0 {
            return Err(MeshworkError::Config(format!(
                "run.temperature must be >= 1.0, got {}",
                self.run.temperature
            )));
        }
        if self.run.max_tries == 0 {
            return Err(MeshworkError::Config("run.max_tries must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.prune.rate) {
            return Err(MeshworkError::Config(format!(
                "prune.rate must lie in [0, 1], got {}",
                self.prune.rate
            )));
        }
        Ok(())
    }

    /// Resolve a path from the config relative to the config file's directory.
    pub fn resolve_path(base: &Path, configured: &str) -> PathBuf {
        let path = PathBuf::from(configured);
        if let Some(rest) = configured.strip_prefix("~/") {
            if let Some(home) = dirs_home() {
                return home.join(rest);
            }
        }
        if path.is_absolute() {
            path
        } else {
            base.parent().unwrap_or_else(|| Path::new(".")).join(path)
        }
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> AppConfig {
        toml::from_str(
            r#"
[model]
model_id = "gpt-4o-mini"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_MESHWORK_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_MESHWORK_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_MESHWORK_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_MESHWORK_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_MESHWORK_VAR}\"");
    }

    #[test]
    fn test_defaults_from_minimal_toml() {
        let config = minimal();
        assert_eq!(config.graph.agents, 5);
        assert_eq!(config.graph.domain, "qa");
        assert_eq!(config.graph.spatial_topology, Topology::FullConnected);
        assert!(!config.graph.optimized_spatial);
        assert_eq!(config.run.num_rounds, 1);
        assert_eq!(config.run.max_tries, 3);
        assert_eq!(config.run.max_time(), Duration::from_secs(600));
        assert_eq!(config.run.decision_policy, DecisionPolicy::Retry);
        assert_eq!(config.prune.rate, 0.25);
        assert_eq!(config.model.provider, "openai");
        assert!(config.journal.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_low_temperature() {
        let mut config = minimal();
        config.run.temperature = 0.5;
        assert!(matches!(config.validate(), Err(MeshworkError::Config(_))));
    }

    #[test]
    fn test_validate_requires_fixed_group() {
        let mut config = minimal();
        config.graph.allow_random_combination = false;
        assert!(config.validate().is_err());
        config.graph.fixed_group = Some("group_2".into());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_probability_bounds() {
        let mut config = minimal();
        config.graph.initial_spatial_probability = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_path_relative_to_config() {
        let base = Path::new("/etc/meshwork/meshwork.toml");
        assert_eq!(
            AppConfig::resolve_path(base, "nodes.json"),
            PathBuf::from("/etc/meshwork/nodes.json")
        );
        assert_eq!(
            AppConfig::resolve_path(base, "/tmp/masks.json"),
            PathBuf::from("/tmp/masks.json")
        );
    }
}
