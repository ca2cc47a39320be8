//! String-keyed registries resolved once when a graph is built: prompt sets
//! by domain, external tool profiles by tool type, and reasoning-backend
//! profiles by model name.

use std::collections::HashMap;
use std::sync::Arc;

use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::types::{ExternalTool, NodeProfile, SlotConfig};

/// A worker role and the persona text handed to the reasoner.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    pub name: String,
    pub description: String,
    /// Adversarial roles are never picked when cycling default roles.
    pub adversarial: bool,
}

/// Role library, role connections, and answer constraints for one domain.
#[derive(Debug, Clone)]
pub struct PromptSet {
    domain: String,
    roles: Vec<RoleSpec>,
    connections: Vec<(String, String)>,
    decision_role: String,
    worker_constraint: String,
    decision_constraint: String,
}

impl PromptSet {
    /// Four-option question answering.
    pub fn qa() -> Self {
        let roles = [
            ("Knowledgeable Expert", "You are a knowledgeable expert in question answering. Name the two to four key entities someone would need to look up to solve the problem, each wrapped in @ symbols, e.g. @catfish effect@. Skip this if nothing needs looking up."),
            ("Searcher", "You receive a question together with search summaries of its key entities. Work through them step by step to reach an answer, and point out weak spots in the other agents' reasoning."),
            ("Critic", "You are a sharp critic. Go through the other agents' analyses point by point and name the flaws."),
            ("Mathematician", "You are a scientist with rigorous logical habits, at home in mathematics, physics, chemistry, medicine, programming and economics. Your answers are precise and carefully derived."),
            ("Psychologist", "You are a humanities scholar covering philosophy, psychology, sociology, literature and history. You bring cultural sensitivity and careful argument to social questions."),
            ("Historian", "You study past cultural, economic, political and social events, work from primary sources, and build explanations of what happened in a period."),
            ("Doctor", "You are a physician. You weigh conventional and alternative treatments against a patient's age, lifestyle and history."),
            ("Lawyer", "You are versed in law, politics and history."),
            ("Economist", "You are versed in economics, finance and business, and you read charts against the prevailing macroeconomic picture."),
            ("Programmer", "You are versed in computer science, engineering and physics, with hands-on experience building software and hardware."),
        ];
        let mut role_specs: Vec<RoleSpec> = roles
            .iter()
            .map(|(name, description)| RoleSpec {
                name: name.to_string(),
                description: description.to_string(),
                adversarial: false,
            })
            .collect();
        role_specs.push(RoleSpec {
            name: "Fake".into(),
            description: "You are a liar who only tells lies. Whatever the other agents say, give a wrong answer with a misleading analysis.".into(),
            adversarial: true,
        });

        let experts = [
            "Mathematician",
            "Psychologist",
            "Historian",
            "Doctor",
            "Lawyer",
            "Economist",
            "Programmer",
        ];
        let mut connections = vec![("Knowledgeable Expert", "Searcher")];
        connections.push(("Searcher", "Critic"));
        for expert in experts {
            connections.push(("Searcher", expert));
            connections.push((expert, "Critic"));
            connections.push(("Critic", expert));
        }
        connections.extend([
            ("Mathematician", "Psychologist"),
            ("Psychologist", "Doctor"),
            ("Programmer", "Mathematician"),
            ("Programmer", "Psychologist"),
            ("Psychologist", "Programmer"),
            ("Mathematician", "Programmer"),
            ("Economist", "Programmer"),
            ("Economist", "Mathematician"),
            ("Historian", "Knowledgeable Expert"),
            ("Lawyer", "Knowledgeable Expert"),
            ("Economist", "Knowledgeable Expert"),
            ("Programmer", "Knowledgeable Expert"),
            ("Doctor", "Knowledgeable Expert"),
        ]);

        Self {
            domain: "qa".into(),
            roles: role_specs,
            connections: connections
                .into_iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            decision_role: "You are the top decision-maker. You analyze and summarize the other agents' opinions, catch their mistakes, and give the final answer.".into(),
            worker_constraint: "You will get a question with four options A, B, C and D, exactly one of which is correct. Treat other agents' reasoning as advice and think critically about it rather than copying it. Keep the reply under 100 words with a brief step-by-step analysis. The first line of the reply must contain only the letter of your answer.".into(),
            decision_constraint: "You will get a question with four options A, B, C and D, exactly one of which is correct, together with other agents' answers and analysis. Reply with a single letter and nothing else.".into(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }

    pub fn connections(&self) -> &[(String, String)] {
        &self.connections
    }

    pub fn decision_role(&self) -> &str {
        &self.decision_role
    }

    pub fn worker_constraint(&self) -> &str {
        &self.worker_constraint
    }

    pub fn decision_constraint(&self) -> &str {
        &self.decision_constraint
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.name == role)
    }

    pub fn description(&self, role: &str) -> Result<&str> {
        self.roles
            .iter()
            .find(|r| r.name == role)
            .map(|r| r.description.as_str())
            .ok_or_else(|| MeshworkError::UnknownRole {
                role: role.to_string(),
                domain: self.domain.clone(),
            })
    }

    /// Default role assignment: cycle the non-adversarial roles over `n` slots.
    pub fn cycle_roles(&self, n: usize) -> Vec<String> {
        self.roles
            .iter()
            .filter(|r| !r.adversarial)
            .map(|r| r.name.clone())
            .cycle()
            .take(n)
            .collect()
    }

    /// Slot pairs `(i, j)` where slot i's role connects to slot j's role.
    pub fn role_adjacency(&self, slot_roles: &[&str]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for (from_role, to_role) in &self.connections {
            for (i, a) in slot_roles.iter().enumerate() {
                if a != from_role {
                    continue;
                }
                for (j, b) in slot_roles.iter().enumerate() {
                    if b == to_role && !pairs.contains(&(i, j)) {
                        pairs.push((i, j));
                    }
                }
            }
        }
        pairs
    }
}

/// Registry of prompt sets keyed by domain.
pub struct PromptSetRegistry {
    factories: HashMap<String, fn() -> PromptSet>,
}

impl PromptSetRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in domains.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("qa", PromptSet::qa);
        registry.register("mmlu", PromptSet::qa);
        registry
    }

    pub fn register(&mut self, domain: impl Into<String>, factory: fn() -> PromptSet) {
        self.factories.insert(domain.into(), factory);
    }

    pub fn get(&self, domain: &str) -> Result<PromptSet> {
        self.factories
            .get(domain)
            .map(|factory| factory())
            .ok_or_else(|| MeshworkError::UnknownDomain(domain.to_string()))
    }
}

impl Default for PromptSetRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Describes an external tool configuration in words.
pub trait ToolProfile: Send + Sync + 'static {
    fn tool_type(&self) -> &str;

    fn describe_mode(&self, mode: &str) -> String;

    fn describe_source(&self, source: &str) -> String;

    fn describe(&self, tool: &ExternalTool) -> String {
        format!(
            "{} {}",
            self.describe_mode(&tool.mode),
            self.describe_source(&tool.source)
        )
    }
}

struct SearchProfile;

impl ToolProfile for SearchProfile {
    fn tool_type(&self) -> &str {
        "Search"
    }

    fn describe_mode(&self, mode: &str) -> String {
        if mode.is_empty() {
            "Searches the web for supporting material.".into()
        } else {
            format!("Searches for supporting material ({} mode).", mode)
        }
    }

    fn describe_source(&self, source: &str) -> String {
        match source {
            "Google" => "Google: the broadest general-purpose index, fast to update, good for open-domain lookups.".into(),
            "Bing" => "Bing: structured results, good for mixed-language lookups.".into(),
            "PubMed" => "PubMed: biomedical literature, good for academic and medical questions.".into(),
            "Arxiv" => "Arxiv: research preprints, good for scientific and technical trends.".into(),
            "Reddit" => "Reddit: community discussion, good for opinions and first-hand experience.".into(),
            "Wikipedia" => "Wikipedia: broad encyclopedic coverage for background knowledge.".into(),
            "DuckDuckGo" => "DuckDuckGo: privacy-focused general web search.".into(),
            other => format!("Unknown search source: {}.", other),
        }
    }
}

struct RagProfile;

impl ToolProfile for RagProfile {
    fn tool_type(&self) -> &str {
        "RAG"
    }

    fn describe_mode(&self, mode: &str) -> String {
        match mode {
            "dense" => "Dense retrieval: neural vector search, strong semantic matching at higher compute cost.".into(),
            "sparse" => "Sparse retrieval: keyword matching, cheap but may miss paraphrases.".into(),
            "hybrid" => "Hybrid retrieval: dense and sparse combined for recall and precision.".into(),
            "retriever_reranker" => "Retrieve then rerank: two-stage retrieval for precision-critical tasks.".into(),
            other => format!("Unknown retrieval mode: {}.", other),
        }
    }

    fn describe_source(&self, source: &str) -> String {
        match source {
            "PDF" => "Knowledge from PDF documents such as reports and papers.".into(),
            "Web" => "Knowledge from heterogeneous web pages.".into(),
            "Database" => "Knowledge from a structured database, precise for facts and figures.".into(),
            "Wikipedia" => "Knowledge from Wikipedia, broad background coverage.".into(),
            "SearchEngine" => "Knowledge from a live search engine, good for recent events.".into(),
            other => format!("Unknown knowledge source: {}.", other),
        }
    }
}

/// Registry of tool profile factories keyed by tool type.
pub struct ToolRegistry {
    factories: HashMap<String, fn() -> Arc<dyn ToolProfile>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("Search", || Arc::new(SearchProfile));
        registry.register("RAG", || Arc::new(RagProfile));
        registry
    }

    pub fn register(&mut self, tool_type: impl Into<String>, factory: fn() -> Arc<dyn ToolProfile>) {
        self.factories.insert(tool_type.into(), factory);
    }

    /// Instantiate the profile for every tool type the slots mention.
    pub fn resolve<'a>(
        &self,
        slots: impl IntoIterator<Item = &'a SlotConfig>,
    ) -> Result<ToolCatalog> {
        let mut profiles: HashMap<String, Arc<dyn ToolProfile>> = HashMap::new();
        for tool in slots.into_iter().filter_map(|s| s.external_tool.as_ref()) {
            if profiles.contains_key(&tool.tool_type) {
                continue;
            }
            let factory = self
                .factories
                .get(&tool.tool_type)
                .ok_or_else(|| MeshworkError::UnknownTool(tool.tool_type.clone()))?;
            profiles.insert(tool.tool_type.clone(), factory());
        }
        Ok(ToolCatalog { profiles })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Tool profiles resolved for one graph.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    profiles: HashMap<String, Arc<dyn ToolProfile>>,
}

impl ToolCatalog {
    pub fn describe(&self, tool: Option<&ExternalTool>) -> String {
        match tool {
            None => "This agent uses no external tool.".into(),
            Some(tool) => match self.profiles.get(&tool.tool_type) {
                Some(profile) => profile.describe(tool),
                None => format!("Unregistered tool type: {}.", tool.tool_type),
            },
        }
    }
}

// (name, size, strengths, vendor)
const LLM_PROFILES: &[(&str, &str, &str, &str)] = &[
    ("gpt-4o", "undisclosed", "strong reasoning, code generation, multimodal input", "OpenAI"),
    ("gpt-4o-mini", "undisclosed, small", "fast, inexpensive general reasoning", "OpenAI"),
    ("gpt-3.5-turbo", "175B parameters", "text generation, code completion, translation", "OpenAI"),
    ("deepseek-chat", "671B parameters (37B active)", "mixture-of-experts, efficient inference", "DeepSeek"),
    ("DeepSeek-V3", "671B parameters (37B active)", "mixture-of-experts, efficient inference", "DeepSeek"),
    ("DeepSeek-R1", "671B parameters (37B active)", "long chain-of-thought reasoning, mathematics", "DeepSeek"),
    ("QwQ-32B", "32B parameters", "step-by-step reasoning, mathematics", "Alibaba"),
    ("Qwen2.5-72B-Instruct-128K", "72B parameters", "long context, multilingual instruction following", "Alibaba"),
    ("Qwen2.5-Coder-32B-Instruct", "32B parameters", "code generation and repair", "Alibaba"),
    ("claude-3-5-sonnet", "undisclosed", "careful reasoning, long conversations", "Anthropic"),
    ("gemini-1.5-pro", "undisclosed", "very long context, multimodal input", "Google"),
    ("llama-3.1-70b", "70B parameters", "open weights, general instruction following", "Meta"),
];

/// Describe a reasoning backend by model name; path prefixes like `Pro/deepseek-ai/` are ignored.
pub fn llm_profile(model: &str) -> String {
    let short = model.rsplit('/').next().unwrap_or(model);
    LLM_PROFILES
        .iter()
        .find(|(name, ..)| name.eq_ignore_ascii_case(short))
        .map(|(name, size, strengths, vendor)| {
            format!("{} by {}: {}; strengths: {}.", name, vendor, size, strengths)
        })
        .unwrap_or_else(|| format!("Reasoning backend {} (no profile on record).", short))
}

/// Textual profile for one slot, used for scorer features.
pub fn node_profile(
    prompt_set: &PromptSet,
    tools: &ToolCatalog,
    slot: &SlotConfig,
    default_model: &str,
) -> Result<NodeProfile> {
    Ok(NodeProfile {
        role: slot.role.clone(),
        role_description: prompt_set.description(&slot.role)?.to_string(),
        llm_profile: llm_profile(slot.llm_name.as_deref().unwrap_or(default_model)),
        tool_profile: tools.describe(slot.external_tool.as_ref()),
    })
}
