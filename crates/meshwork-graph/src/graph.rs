use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};
use uuid::Uuid;

use meshwork_core::config::{AppConfig, GraphConfig, ModelConfig};
use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::{EdgeScorer, LlmClient, Reasoner};
use meshwork_core::types::{EdgeKind, RunOutput, Topology};

use crate::decision::aggregate;
use crate::edge::{potential_edges, EdgeState, PotentialEdge};
use crate::groups::{ConfigurationGroups, DEFAULT_GROUP};
use crate::node::{AgentNode, NodeArena};
use crate::prompt::PromptReasoner;
use crate::pruner::{MaskPruner, PruneOutcome};
use crate::registry::{node_profile, PromptSet, PromptSetRegistry, ToolRegistry};
use crate::sampler::EdgeSampler;
use crate::scheduler::{drain_round, ExecutionMode, RunOptions};
use crate::scorer::{min_max_norm, LexicalScorer};
use crate::snapshot::MaskSnapshot;
use crate::topology;

/// Builder for [`Graph`].
pub struct GraphBuilder {
    agents: usize,
    domain: String,
    spatial_topology: Topology,
    temporal_topology: Option<Topology>,
    optimized_spatial: bool,
    optimized_temporal: bool,
    initial_spatial_probability: f64,
    initial_temporal_probability: f64,
    groups: Option<ConfigurationGroups>,
    allow_random_combination: bool,
    fixed_group: Option<String>,
    snapshot: Option<MaskSnapshot>,
    seed: Option<u64>,
    reasoner: Option<Arc<dyn Reasoner>>,
    llm: Option<(Arc<dyn LlmClient>, ModelConfig)>,
    scorer: Option<Arc<dyn EdgeScorer>>,
    prompt_sets: PromptSetRegistry,
    tools: ToolRegistry,
}

impl GraphBuilder {
    pub fn new(agents: usize) -> Self {
        Self::from_config(&GraphConfig {
            agents,
            ..Default::default()
        })
    }

    /// Everything from `[graph]` except the files it names.
    pub fn from_config(config: &GraphConfig) -> Self {
        Self {
            agents: config.agents,
            domain: config.domain.clone(),
            spatial_topology: config.spatial_topology,
            temporal_topology: config.temporal_topology,
            optimized_spatial: config.optimized_spatial,
            optimized_temporal: config.optimized_temporal,
            initial_spatial_probability: config.initial_spatial_probability,
            initial_temporal_probability: config.initial_temporal_probability,
            groups: None,
            allow_random_combination: config.allow_random_combination,
            fixed_group: config.fixed_group.clone(),
            snapshot: None,
            seed: config.seed,
            reasoner: None,
            llm: None,
            scorer: None,
            prompt_sets: PromptSetRegistry::with_builtins(),
            tools: ToolRegistry::with_builtins(),
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn topology(mut self, spatial: Topology, temporal: Option<Topology>) -> Self {
        self.spatial_topology = spatial;
        self.temporal_topology = temporal;
        self
    }

    pub fn optimized(mut self, spatial: bool, temporal: bool) -> Self {
        self.optimized_spatial = spatial;
        self.optimized_temporal = temporal;
        self
    }

    pub fn initial_probabilities(mut self, spatial: f64, temporal: f64) -> Self {
        self.initial_spatial_probability = spatial;
        self.initial_temporal_probability = temporal;
        self
    }

    pub fn groups(mut self, groups: ConfigurationGroups) -> Self {
        self.groups = Some(groups);
        self
    }

    /// Pin every run to one group unless a run names another.
    pub fn fixed_group(mut self, name: impl Into<String>) -> Self {
        self.allow_random_combination = false;
        self.fixed_group = Some(name.into());
        self
    }

    pub fn masks(mut self, snapshot: MaskSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn reasoner(mut self, reasoner: Arc<dyn Reasoner>) -> Self {
        self.reasoner = Some(reasoner);
        self
    }

    /// Reason through a [`PromptReasoner`] over this client.
    pub fn llm(mut self, client: Arc<dyn LlmClient>, model: ModelConfig) -> Self {
        self.llm = Some((client, model));
        self
    }

    pub fn scorer(mut self, scorer: Arc<dyn EdgeScorer>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    pub fn prompt_sets(mut self, registry: PromptSetRegistry) -> Self {
        self.prompt_sets = registry;
        self
    }

    pub fn tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = registry;
        self
    }

    pub fn build(self) -> Result<Graph> {
        if self.agents == 0 {
            return Err(MeshworkError::Config("a graph needs at least one agent".into()));
        }
        for (kind, p) in [
            (EdgeKind::Spatial, self.initial_spatial_probability),
            (EdgeKind::Temporal, self.initial_temporal_probability),
        ] {
            if !(p > 0.0 && p < 1.0) {
                return Err(MeshworkError::Config(format!(
                    "initial {} probability must lie strictly between 0 and 1, got {}",
                    kind, p
                )));
            }
        }
        let prompt_set = self.prompt_sets.get(&self.domain)?;

        let mut groups = match self.groups {
            Some(groups) => groups,
            None => ConfigurationGroups::single(prompt_set.cycle_roles(self.agents)),
        };
        if groups.agents() != self.agents {
            return Err(MeshworkError::GroupSize {
                group: groups.names().next().unwrap_or(DEFAULT_GROUP).to_string(),
                expected: self.agents,
                actual: groups.agents(),
            });
        }
        for group in groups.iter() {
            for slot in &group.slots {
                prompt_set.description(&slot.role)?;
            }
        }
        let tools = self.tools.resolve(groups.iter().flat_map(|g| g.slots.iter()))?;

        let fixed_group = if self.allow_random_combination {
            None
        } else {
            let name = self.fixed_group.ok_or_else(|| {
                MeshworkError::Config(
                    "a fixed group is required when random combination is disabled".into(),
                )
            })?;
            groups.get(&name)?;
            Some(name)
        };

        let default_model = self
            .llm
            .as_ref()
            .map(|(_, model)| model.model_id.clone())
            .unwrap_or_default();
        if let Some(scorer) = &self.scorer {
            groups.cache_features(|group| {
                let profiles = group
                    .slots
                    .iter()
                    .map(|slot| node_profile(&prompt_set, &tools, slot, &default_model))
                    .collect::<Result<Vec<_>>>()?;
                scorer.features(&profiles)
            })?;
        }

        let reasoner: Arc<dyn Reasoner> = match (self.reasoner, self.llm) {
            (Some(reasoner), _) => reasoner,
            (None, Some((client, model))) => Arc::new(PromptReasoner::new(
                client,
                model,
                prompt_set.clone(),
                tools.clone(),
            )),
            (None, None) => {
                return Err(MeshworkError::Config(
                    "a graph needs a reasoner or an LLM client".into(),
                ))
            }
        };

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let masks = topology::masks(
            self.spatial_topology,
            self.temporal_topology,
            self.agents,
            &mut rng,
        );
        let mut spatial = EdgeState::new(
            EdgeKind::Spatial,
            self.agents,
            masks.spatial,
            self.optimized_spatial,
            self.initial_spatial_probability,
        )?;
        let mut temporal = EdgeState::new(
            EdgeKind::Temporal,
            self.agents,
            masks.temporal,
            self.optimized_temporal,
            self.initial_temporal_probability,
        )?;
        let mut prunes = 0;
        if let Some(snapshot) = &self.snapshot {
            snapshot.check(self.agents)?;
            spatial.restrict(&snapshot.spatial)?;
            temporal.restrict(&snapshot.temporal)?;
            prunes = snapshot.prunes;
        }

        let first = match &fixed_group {
            Some(name) => name.clone(),
            None => groups.names().next().ok_or(MeshworkError::NoGroups)?.to_string(),
        };

        let id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut graph = Graph {
            id,
            agents: self.agents,
            arena: NodeArena::build(&[]),
            potential_edges: Vec::new(),
            active_group: String::new(),
            groups,
            fixed_group,
            prompt_set,
            reasoner,
            scorer: self.scorer,
            spatial,
            temporal,
            prunes,
            rng,
        };
        graph.activate_group(&first)?;
        info!(
            graph = %graph.id,
            agents = graph.agents,
            groups = graph.groups.len(),
            domain = %graph.prompt_set.domain(),
            "Graph built"
        );
        Ok(graph)
    }
}

/// A dynamically re-wired agent graph.
pub struct Graph {
    id: String,
    agents: usize,
    arena: NodeArena,
    potential_edges: Vec<PotentialEdge>,
    active_group: String,
    groups: ConfigurationGroups,
    fixed_group: Option<String>,
    prompt_set: PromptSet,
    reasoner: Arc<dyn Reasoner>,
    scorer: Option<Arc<dyn EdgeScorer>>,
    spatial: EdgeState,
    temporal: EdgeState,
    prunes: usize,
    rng: StdRng,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("agents", &self.agents)
            .field("active_group", &self.active_group)
            .field("prunes", &self.prunes)
            .finish_non_exhaustive()
    }
}

impl Graph {
    pub fn builder(agents: usize) -> GraphBuilder {
        GraphBuilder::new(agents)
    }

    /// Build from a loaded config file: node groups, mask snapshot, the
    /// lexical scorer and a prompt reasoner over `client`.
    pub fn from_config(
        config: &AppConfig,
        config_path: &Path,
        client: Arc<dyn LlmClient>,
    ) -> Result<Self> {
        let g = &config.graph;
        let mut builder = GraphBuilder::from_config(g)
            .llm(client, config.model.clone())
            .scorer(Arc::new(LexicalScorer::default()));

        if let Some(file) = &g.node_config_file {
            let path = AppConfig::resolve_path(config_path, file);
            builder = builder.groups(ConfigurationGroups::load(&path, g.agents)?);
        }
        if let Some(path) = Self::mask_path(config, config_path) {
            if let Some(snapshot) = MaskSnapshot::load_optional(&path)? {
                info!(path = %path.display(), prunes = snapshot.prunes, "Loaded mask snapshot");
                builder = builder.masks(snapshot);
            }
        }
        builder.build()
    }

    /// Where `[graph].mask_file` points, resolved against the config file.
    pub fn mask_path(config: &AppConfig, config_path: &Path) -> Option<PathBuf> {
        config
            .graph
            .mask_file
            .as_deref()
            .map(|file| AppConfig::resolve_path(config_path, file))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn agents(&self) -> usize {
        self.agents
    }

    pub fn active_group(&self) -> &str {
        &self.active_group
    }

    pub fn groups(&self) -> &ConfigurationGroups {
        &self.groups
    }

    pub fn prompt_set(&self) -> &PromptSet {
        &self.prompt_set
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn spatial(&self) -> &EdgeState {
        &self.spatial
    }

    pub fn temporal(&self) -> &EdgeState {
        &self.temporal
    }

    /// Logits are open to an external optimizer; masks are not.
    pub fn spatial_mut(&mut self) -> &mut EdgeState {
        &mut self.spatial
    }

    pub fn temporal_mut(&mut self) -> &mut EdgeState {
        &mut self.temporal
    }

    pub fn prunes(&self) -> usize {
        self.prunes
    }

    /// Rebuild all nodes for `name`. Memory and realized edges are discarded.
    pub fn activate_group(&mut self, name: &str) -> Result<()> {
        let group = self.groups.get(name)?;
        self.arena = NodeArena::build(&group.slots);
        self.potential_edges = potential_edges(&self.arena.worker_ids());
        self.active_group = name.to_string();
        debug!(graph = %self.id, group = name, "Activated configuration group");
        Ok(())
    }

    fn select_group(&mut self, fixed: Option<&str>) -> Result<String> {
        let fixed = fixed.or(self.fixed_group.as_deref());
        let group = self.groups.select(fixed, &mut self.rng)?;
        Ok(group.name.clone())
    }

    /// Replace spatial logits with the scorer's view of this group and task.
    fn score_spatial(&mut self, task: &str) -> Result<()> {
        let Some(scorer) = &self.scorer else {
            return Ok(());
        };
        let group = self.groups.get(&self.active_group)?;
        let Some(features) = &group.features else {
            return Ok(());
        };
        let roles: Vec<&str> = group.slots.iter().map(|s| s.role.as_str()).collect();
        let adjacency = self.prompt_set.role_adjacency(&roles);
        let logits = scorer.score(features, &adjacency, task)?;
        self.spatial.set_logits(min_max_norm(&logits))
    }

    async fn execute(
        &mut self,
        task: &str,
        options: &RunOptions,
        fixed_group: Option<&str>,
        mode: ExecutionMode,
    ) -> Result<RunOutput> {
        let sampler = EdgeSampler::new(options.temperature, options.threshold)?;
        let group = self.select_group(fixed_group)?;
        self.activate_group(&group)?;
        self.score_spatial(task)?;
        info!(graph = %self.id, group = %group, rounds = options.num_rounds, "Starting run");

        let mut log_probability = 0.0;
        let mut rounds = Vec::with_capacity(options.num_rounds);
        for round in 0..options.num_rounds {
            let mut round_lp = sampler.realize(
                &mut self.arena,
                &self.potential_edges,
                &self.spatial,
                &mut self.rng,
            )?;
            round_lp += sampler.realize_temporal(
                round,
                &mut self.arena,
                &self.potential_edges,
                &self.temporal,
                &mut self.rng,
            )?;

            let mut report = drain_round(
                &mut self.arena,
                self.reasoner.as_ref(),
                task,
                round,
                options,
                mode,
            )
            .await;
            report.log_probability = round_lp;
            log_probability += round_lp;
            info!(
                round,
                executed = report.executed.len(),
                failed = report.failed.len(),
                spatial_edges = self.arena.edge_count(EdgeKind::Spatial),
                "Round complete"
            );
            rounds.push(report);
        }

        let final_answers = aggregate(
            &mut self.arena,
            self.reasoner.as_ref(),
            task,
            options.num_rounds,
            options,
            mode,
        )
        .await?;

        Ok(RunOutput {
            group,
            final_answers,
            log_probability,
            rounds,
        })
    }

    /// Run on the async runtime; every node attempt is bounded by `options.max_time`.
    pub async fn arun(
        &mut self,
        task: &str,
        options: &RunOptions,
        fixed_group: Option<&str>,
    ) -> Result<RunOutput> {
        let mode = ExecutionMode::Suspending {
            timeout: options.max_time,
        };
        self.execute(task, options, fixed_group, mode).await
    }

    /// Run to completion on the calling thread, without per-attempt timeouts.
    ///
    /// Drives the run on a private current-thread runtime, so it must not be
    /// called from inside an async context; use [`Graph::arun`] there.
    pub fn run(
        &mut self,
        task: &str,
        options: &RunOptions,
        fixed_group: Option<&str>,
    ) -> Result<RunOutput> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(self.execute(task, options, fixed_group, ExecutionMode::Blocking))
    }

    /// Prune both edge kinds at `rate`. Static kinds are left alone.
    pub fn update_masks(&mut self, rate: f64) -> Result<Vec<PruneOutcome>> {
        let pruner = MaskPruner::new(rate)?;
        let outcomes = vec![pruner.prune(&mut self.spatial), pruner.prune(&mut self.temporal)];
        if outcomes.iter().any(|o| !o.skipped) {
            self.prunes += 1;
        }
        Ok(outcomes)
    }

    pub fn snapshot(&self) -> MaskSnapshot {
        MaskSnapshot {
            agents: self.agents,
            spatial: self.spatial.masks().to_vec(),
            temporal: self.temporal.masks().to_vec(),
            prunes: self.prunes,
        }
    }

    pub fn spatial_adj_matrix(&self) -> Vec<Vec<u8>> {
        self.arena.adjacency_matrix(EdgeKind::Spatial)
    }

    pub fn temporal_adj_matrix(&self) -> Vec<Vec<u8>> {
        self.arena.adjacency_matrix(EdgeKind::Temporal)
    }

    /// Realized worker-to-worker spatial edges.
    pub fn num_edges(&self) -> usize {
        self.arena.edge_count(EdgeKind::Spatial)
    }

    pub fn num_nodes(&self) -> usize {
        self.arena.worker_count()
    }

    pub fn find_node(&self, id: &str) -> Result<&AgentNode> {
        self.arena.find(id).map(|idx| self.arena.node(idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use meshwork_core::types::NO_ANSWER;
    use meshwork_test_utils::{temp_file, two_group_nodes_json, MockLlm, MockReasoner};

    fn two_groups() -> ConfigurationGroups {
        let file = temp_file(".json", &two_group_nodes_json().to_string());
        ConfigurationGroups::load(file.path(), 3).unwrap()
    }

    #[test]
    fn test_build_default_group() {
        let graph = Graph::builder(4)
            .reasoner(Arc::new(MockReasoner::new()))
            .seed(1)
            .build()
            .unwrap();
        assert_eq!(graph.active_group(), DEFAULT_GROUP);
        assert_eq!(graph.num_nodes(), 4);
        assert_eq!(graph.spatial().len(), 16);
        assert_eq!(graph.spatial().logits()[0], crate::edge::STATIC_LOGIT);
        let id = graph.arena().node(2).id().to_string();
        assert_eq!(graph.find_node(&id).unwrap().role(), "Critic");
        assert!(graph.find_node("missing").is_err());
    }

    #[test]
    fn test_build_requires_reasoner() {
        assert!(matches!(
            Graph::builder(2).build(),
            Err(MeshworkError::Config(_))
        ));
    }

    #[test]
    fn test_initial_probabilities_are_validated() {
        for (spatial, temporal) in [(0.0, 0.5), (0.5, 1.0), (f64::NAN, 0.5)] {
            let err = Graph::builder(3)
                .optimized(true, true)
                .initial_probabilities(spatial, temporal)
                .reasoner(Arc::new(MockReasoner::new()))
                .build()
                .unwrap_err();
            assert!(matches!(err, MeshworkError::Config(_)));
        }
        Graph::builder(3)
            .initial_probabilities(0.1, 0.9)
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap();
    }

    #[test]
    fn test_group_size_mismatch_at_build() {
        let err = Graph::builder(4)
            .groups(two_groups())
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshworkError::GroupSize { expected: 4, .. }));
    }

    #[test]
    fn test_unknown_role_at_build() {
        let groups = ConfigurationGroups::single(vec!["Critic".into(), "Astronaut".into()]);
        let err = Graph::builder(2)
            .groups(groups)
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, MeshworkError::UnknownRole { .. }));
    }

    #[test]
    fn test_snapshot_restricts_masks() {
        let snapshot = MaskSnapshot {
            agents: 2,
            spatial: vec![0, 0, 1, 0],
            temporal: vec![1, 1, 1, 1],
            prunes: 4,
        };
        let graph = Graph::builder(2)
            .reasoner(Arc::new(MockReasoner::new()))
            .masks(snapshot)
            .build()
            .unwrap();
        // the topology never opens a diagonal, the snapshot closed 0 -> 1
        assert_eq!(graph.spatial().masks(), &[0, 0, 1, 0]);
        assert_eq!(graph.prunes(), 4);
    }

    #[test]
    fn test_blocking_run() {
        let reasoner = MockReasoner::new();
        let log = reasoner.calls();
        let mut graph = Graph::builder(3)
            .reasoner(Arc::new(reasoner))
            .seed(5)
            .build()
            .unwrap();
        let out = graph.run("q", &RunOptions::default(), None).unwrap();
        assert_eq!(out.final_answers, vec!["Decision Maker@1".to_string()]);
        assert_eq!(out.log_probability, 0.0);
        assert_eq!(log.len(), 4);
        assert_eq!(graph.num_edges(), 3);
    }

    #[test]
    fn test_blocking_run_drives_timers() {
        let mut graph = Graph::builder(2)
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap();
        let role = graph.arena().node(0).role().to_string();
        let reasoner = MockReasoner::new().with_delay(role, Duration::from_millis(5));
        let log = reasoner.calls();
        graph.reasoner = Arc::new(reasoner);

        let out = graph.run("q", &RunOptions::default(), None).unwrap();
        assert_eq!(out.rounds[0].failed.len(), 0);
        assert_eq!(log.decision_calls(), 1);
    }

    #[tokio::test]
    async fn test_fixed_group_override() {
        let mut graph = Graph::builder(3)
            .groups(two_groups())
            .reasoner(Arc::new(MockReasoner::new()))
            .seed(3)
            .build()
            .unwrap();
        for _ in 0..5 {
            let out = graph
                .arun("q", &RunOptions::default(), Some("group_2"))
                .await
                .unwrap();
            assert_eq!(out.group, "group_2");
        }
        let err = graph
            .arun("q", &RunOptions::default(), Some("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, MeshworkError::UnknownGroup(_)));
    }

    #[tokio::test]
    async fn test_builder_fixed_group_pins_runs() {
        let mut graph = Graph::builder(3)
            .groups(two_groups())
            .fixed_group("group_1")
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap();
        assert_eq!(graph.active_group(), "group_1");
        for _ in 0..5 {
            let out = graph.arun("q", &RunOptions::default(), None).await.unwrap();
            assert_eq!(out.group, "group_1");
        }
    }

    #[tokio::test]
    async fn test_scorer_sets_normalized_logits() {
        let mut graph = Graph::builder(3)
            .groups(two_groups())
            .optimized(true, false)
            .scorer(Arc::new(LexicalScorer::default()))
            .llm(Arc::new(MockLlm::constant("A")), meshwork_test_utils::model_config("gpt-4o"))
            .seed(9)
            .build()
            .unwrap();
        let out = graph
            .arun("Which economist wrote about inflation?", &RunOptions::default(), None)
            .await
            .unwrap();
        assert_eq!(out.final_answers, vec!["A".to_string()]);
        let logits = graph.spatial().logits();
        assert!(logits.iter().all(|l| (-1.0..=1.0).contains(l)));
        assert!(logits.iter().any(|&l| l == -1.0));
        assert!(logits.iter().any(|&l| l == 1.0));
        assert!(out.log_probability < 0.0);
    }

    #[test]
    fn test_update_masks_counts_passes() {
        let mut graph = Graph::builder(3)
            .optimized(true, false)
            .reasoner(Arc::new(MockReasoner::new()))
            .build()
            .unwrap();
        let outcomes = graph.update_masks(0.5).unwrap();
        assert_eq!(outcomes[0].pruned, 3);
        assert!(outcomes[1].skipped);
        assert_eq!(graph.prunes(), 1);
        assert_eq!(graph.snapshot().spatial.iter().filter(|&&m| m == 1).count(), 3);
        assert!(graph.update_masks(2.0).is_err());
    }

    #[tokio::test]
    async fn test_empty_decision_yields_sentinel() {
        let mut graph = Graph::builder(2)
            .reasoner(Arc::new(MockReasoner::new().empty_decision()))
            .build()
            .unwrap();
        let out = graph.arun("q", &RunOptions::default(), None).await.unwrap();
        assert_eq!(out.final_answers, vec![NO_ANSWER.to_string()]);
    }
}
