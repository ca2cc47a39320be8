use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Answer substituted when the decision node produces nothing.
pub const NO_ANSWER: &str = "No answer of the decision node";

/// The two kinds of edge a graph realizes every run.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Within-round dependency: execution order and output propagation.
    Spatial,
    /// Cross-round dependency: memory from round r feeds round r+1.
    Temporal,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 2] = [EdgeKind::Spatial, EdgeKind::Temporal];
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeKind::Spatial => write!(f, "spatial"),
            EdgeKind::Temporal => write!(f, "temporal"),
        }
    }
}

/// Short random node identifier, unique within one graph.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        let raw = Uuid::new_v4().simple().to_string();
        Self(raw[..6].to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Worker or terminal decision node.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeVariant {
    Worker,
    Decision,
}

/// External tool attached to a slot, e.g. `{"type": "Search", "mode": "web", "source": "Arxiv"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub source: String,
}

/// Per-slot node configuration inside a configuration group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub role: String,
    /// Reasoning-backend identifier; `None` uses the configured default model.
    #[serde(default)]
    pub llm_name: Option<String>,
    #[serde(default)]
    pub external_tool: Option<ExternalTool>,
}

impl SlotConfig {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            llm_name: None,
            external_tool: None,
        }
    }

    pub fn with_llm(mut self, llm_name: impl Into<String>) -> Self {
        self.llm_name = Some(llm_name.into());
        self
    }

    pub fn with_tool(mut self, tool: ExternalTool) -> Self {
        self.external_tool = Some(tool);
        self
    }
}

/// One appended memory record: the node's outputs at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub round: usize,
    pub outputs: Vec<String>,
}

/// Output of a neighbouring node handed to the reasoner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerOutput {
    pub node_id: String,
    pub role: String,
    pub outputs: Vec<String>,
}

/// Everything a reasoner needs to produce one node's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub node_id: String,
    pub variant: NodeVariant,
    pub role: String,
    #[serde(default)]
    pub llm_name: Option<String>,
    #[serde(default)]
    pub external_tool: Option<ExternalTool>,
    pub task: String,
    pub round: usize,
    /// The node's own memory, oldest first.
    pub memory: Vec<MemoryEntry>,
    /// Current outputs of realized spatial predecessors.
    pub spatial_inputs: Vec<PeerOutput>,
    /// Latest memory of realized temporal predecessors.
    pub temporal_inputs: Vec<PeerOutput>,
}

/// Role in a chat exchange with a reasoning backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: text.into(),
        }
    }
}

/// Textual profile of a slot, the raw material for scorer features.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProfile {
    pub role: String,
    pub role_description: String,
    pub llm_profile: String,
    pub tool_profile: String,
}

/// Precomputed per-slot feature vectors for one configuration group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupFeatures {
    /// Role-derived features, one vector per slot.
    pub static_features: Vec<Vec<f32>>,
    /// Backend and tool derived features, one vector per slot.
    pub dynamic_features: Vec<Vec<f32>>,
}

/// Fixed mask presets for the spatial and temporal edge kinds.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    #[default]
    FullConnected,
    Random,
    Chain,
    Debate,
    Layered,
    Mesh,
    Star,
    DirectAnswer,
}

/// What happened during one round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundReport {
    pub round: usize,
    /// Node ids in the order they were executed.
    pub executed: Vec<String>,
    /// Node ids that exhausted their retry budget.
    pub failed: Vec<String>,
    pub log_probability: f64,
}

/// Result of a full run, handed back to an external optimizer/evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub group: String,
    pub final_answers: Vec<String>,
    pub log_probability: f64,
    pub rounds: Vec<RoundReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_shape() {
        let id = NodeId::new();
        assert_eq!(id.0.len(), 6);
        assert_ne!(id, NodeId::new());
    }

    #[test]
    fn test_slot_config_from_json() {
        let json = r#"{"role": "Searcher", "llm_name": "gpt-4o-mini",
            "external_tool": {"type": "Search", "mode": "web", "source": "Arxiv"}}"#;
        let slot: SlotConfig = serde_json::from_str(json).unwrap();
        assert_eq!(slot.role, "Searcher");
        assert_eq!(slot.llm_name.as_deref(), Some("gpt-4o-mini"));
        let tool = slot.external_tool.unwrap();
        assert_eq!(tool.tool_type, "Search");
        assert_eq!(tool.source, "Arxiv");
    }

    #[test]
    fn test_slot_config_minimal() {
        let slot: SlotConfig = serde_json::from_str(r#"{"role": "Critic"}"#).unwrap();
        assert_eq!(slot, SlotConfig::new("Critic"));
    }

    #[test]
    fn test_topology_names() {
        let t: Topology = serde_json::from_str("\"full_connected\"").unwrap();
        assert_eq!(t, Topology::FullConnected);
        let t: Topology = serde_json::from_str("\"direct_answer\"").unwrap();
        assert_eq!(t, Topology::DirectAnswer);
    }
}
