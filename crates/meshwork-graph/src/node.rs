use std::collections::HashMap;

use tracing::debug;

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::Reasoner;
use meshwork_core::types::{
    EdgeKind, ExternalTool, MemoryEntry, NodeId, NodeVariant, PeerOutput, ReasoningRequest,
    SlotConfig,
};

/// A unit of work in the graph.
///
/// Adjacency is kept as indices into the owning [`NodeArena`].
#[derive(Debug, Clone)]
pub struct AgentNode {
    id: String,
    variant: NodeVariant,
    role: String,
    llm_name: Option<String>,
    external_tool: Option<ExternalTool>,
    spatial_successors: Vec<usize>,
    spatial_predecessors: Vec<usize>,
    temporal_successors: Vec<usize>,
    temporal_predecessors: Vec<usize>,
    memory: Vec<MemoryEntry>,
    outputs: Vec<String>,
}

impl AgentNode {
    pub fn worker(id: impl Into<String>, slot: &SlotConfig) -> Self {
        Self::blank(id.into(), NodeVariant::Worker, slot.role.clone())
            .with_backend(slot.llm_name.clone(), slot.external_tool.clone())
    }

    pub fn decision(id: impl Into<String>) -> Self {
        Self::blank(id.into(), NodeVariant::Decision, "Decision Maker".into())
    }

    fn blank(id: String, variant: NodeVariant, role: String) -> Self {
        Self {
            id,
            variant,
            role,
            llm_name: None,
            external_tool: None,
            spatial_successors: Vec::new(),
            spatial_predecessors: Vec::new(),
            temporal_successors: Vec::new(),
            temporal_predecessors: Vec::new(),
            memory: Vec::new(),
            outputs: Vec::new(),
        }
    }

    fn with_backend(mut self, llm_name: Option<String>, tool: Option<ExternalTool>) -> Self {
        self.llm_name = llm_name;
        self.external_tool = tool;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn variant(&self) -> NodeVariant {
        self.variant
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn llm_name(&self) -> Option<&str> {
        self.llm_name.as_deref()
    }

    pub fn external_tool(&self) -> Option<&ExternalTool> {
        self.external_tool.as_ref()
    }

    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    pub fn memory(&self) -> &[MemoryEntry] {
        &self.memory
    }

    pub fn successors(&self, kind: EdgeKind) -> &[usize] {
        match kind {
            EdgeKind::Spatial => &self.spatial_successors,
            EdgeKind::Temporal => &self.temporal_successors,
        }
    }

    pub fn predecessors(&self, kind: EdgeKind) -> &[usize] {
        match kind {
            EdgeKind::Spatial => &self.spatial_predecessors,
            EdgeKind::Temporal => &self.temporal_predecessors,
        }
    }

    fn successors_mut(&mut self, kind: EdgeKind) -> &mut Vec<usize> {
        match kind {
            EdgeKind::Spatial => &mut self.spatial_successors,
            EdgeKind::Temporal => &mut self.temporal_successors,
        }
    }

    fn predecessors_mut(&mut self, kind: EdgeKind) -> &mut Vec<usize> {
        match kind {
            EdgeKind::Spatial => &mut self.spatial_predecessors,
            EdgeKind::Temporal => &mut self.temporal_predecessors,
        }
    }

    /// Ask the reasoner for this node's output and overwrite `outputs`.
    ///
    /// A blank reply clears the outputs. On error the previous outputs stay.
    pub async fn execute(
        &mut self,
        request: ReasoningRequest,
        reasoner: &dyn Reasoner,
    ) -> Result<Vec<String>> {
        let text = reasoner.generate(request).await?;
        self.outputs = if text.trim().is_empty() {
            Vec::new()
        } else {
            vec![text]
        };
        debug!(node = %self.id, role = %self.role, outputs = self.outputs.len(), "Node executed");
        Ok(self.outputs.clone())
    }

    /// Append the current outputs to memory.
    pub fn update_memory(&mut self, round: usize) {
        self.memory.push(MemoryEntry {
            round,
            outputs: self.outputs.clone(),
        });
    }

    pub fn last_memory(&self) -> Option<&MemoryEntry> {
        self.memory.last()
    }
}

/// Owns every node of one activated group: workers at `0..workers`, the
/// decision node at index `workers`.
#[derive(Debug, Clone)]
pub struct NodeArena {
    nodes: Vec<AgentNode>,
    workers: usize,
    index: HashMap<String, usize>,
}

impl NodeArena {
    /// Build fresh worker nodes for `slots` plus a decision node. Ids are
    /// random and unique within the arena.
    pub fn build(slots: &[SlotConfig]) -> Self {
        let mut index = HashMap::new();
        let mut nodes = Vec::with_capacity(slots.len() + 1);
        let fresh_id = |index: &HashMap<String, usize>| loop {
            let id = NodeId::new().0;
            if !index.contains_key(&id) {
                break id;
            }
        };

        for slot in slots {
            let id = fresh_id(&index);
            index.insert(id.clone(), nodes.len());
            nodes.push(AgentNode::worker(id, slot));
        }
        let decision_id = fresh_id(&index);
        index.insert(decision_id.clone(), nodes.len());
        nodes.push(AgentNode::decision(decision_id));

        Self {
            nodes,
            workers: slots.len(),
            index,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn decision_index(&self) -> usize {
        self.workers
    }

    pub fn node(&self, idx: usize) -> &AgentNode {
        &self.nodes[idx]
    }

    pub fn node_mut(&mut self, idx: usize) -> &mut AgentNode {
        &mut self.nodes[idx]
    }

    pub fn workers(&self) -> &[AgentNode] {
        &self.nodes[..self.workers]
    }

    pub fn decision(&self) -> &AgentNode {
        &self.nodes[self.workers]
    }

    pub fn worker_ids(&self) -> Vec<String> {
        self.workers().iter().map(|n| n.id.clone()).collect()
    }

    /// Index of the node with this id.
    pub fn find(&self, id: &str) -> Result<usize> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| MeshworkError::UnknownNode {
                id: id.to_string(),
                known: self.nodes.iter().map(|n| n.id.clone()).collect(),
            })
    }

    /// Register `from -> to` on both ends. Repeated calls are no-ops.
    pub fn add_successor(&mut self, from: usize, to: usize, kind: EdgeKind) {
        if self.nodes[from].successors(kind).contains(&to) {
            return;
        }
        self.nodes[from].successors_mut(kind).push(to);
        self.nodes[to].predecessors_mut(kind).push(from);
    }

    /// Drop every realized edge of `kind`, decision node included.
    pub fn clear_connections(&mut self, kind: EdgeKind) {
        for node in &mut self.nodes {
            node.successors_mut(kind).clear();
            node.predecessors_mut(kind).clear();
        }
    }

    /// Would adding `from -> to` close a cycle among edges of `kind`?
    pub fn would_create_cycle(&self, from: usize, to: usize, kind: EdgeKind) -> bool {
        if from == to {
            return true;
        }
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self.nodes[to].successors(kind).to_vec();
        while let Some(idx) = stack.pop() {
            if idx == from {
                return true;
            }
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            stack.extend_from_slice(self.nodes[idx].successors(kind));
        }
        false
    }

    /// Assemble the reasoner input for one node from the current graph state.
    pub fn request_for(&self, idx: usize, task: &str, round: usize) -> ReasoningRequest {
        let node = &self.nodes[idx];
        let spatial_inputs = node
            .predecessors(EdgeKind::Spatial)
            .iter()
            .map(|&p| {
                let peer = &self.nodes[p];
                PeerOutput {
                    node_id: peer.id.clone(),
                    role: peer.role.clone(),
                    outputs: peer.outputs.clone(),
                }
            })
            .collect();
        let temporal_inputs = node
            .predecessors(EdgeKind::Temporal)
            .iter()
            .filter_map(|&p| {
                let peer = &self.nodes[p];
                peer.last_memory().map(|m| PeerOutput {
                    node_id: peer.id.clone(),
                    role: peer.role.clone(),
                    outputs: m.outputs.clone(),
                })
            })
            .collect();

        ReasoningRequest {
            node_id: node.id.clone(),
            variant: node.variant,
            role: node.role.clone(),
            llm_name: node.llm_name.clone(),
            external_tool: node.external_tool.clone(),
            task: task.to_string(),
            round,
            memory: node.memory.clone(),
            spatial_inputs,
            temporal_inputs,
        }
    }

    /// Append current outputs to every worker's memory.
    pub fn update_memory(&mut self, round: usize) {
        for node in &mut self.nodes[..self.workers] {
            node.update_memory(round);
        }
    }

    /// Worker-by-worker 0/1 matrix of realized edges (row = source).
    pub fn adjacency_matrix(&self, kind: EdgeKind) -> Vec<Vec<u8>> {
        let n = self.workers;
        let mut matrix = vec![vec![0u8; n]; n];
        for (i, node) in self.workers().iter().enumerate() {
            for &j in node.successors(kind) {
                if j < n {
                    matrix[i][j] = 1;
                }
            }
        }
        matrix
    }

    /// Realized worker-to-worker edges of `kind`.
    pub fn edge_count(&self, kind: EdgeKind) -> usize {
        self.workers()
            .iter()
            .map(|n| n.successors(kind).iter().filter(|&&s| s < self.workers).count())
            .sum()
    }
}
