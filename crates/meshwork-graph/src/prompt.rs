use std::fmt::Write as _;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use meshwork_core::config::ModelConfig;
use meshwork_core::error::Result;
use meshwork_core::traits::{LlmClient, Reasoner};
use meshwork_core::types::{ChatMessage, NodeVariant, PeerOutput, ReasoningRequest};

use crate::registry::{PromptSet, ToolCatalog};

/// Reasoner that turns a node's inputs into a chat exchange with an LLM.
pub struct PromptReasoner {
    client: Arc<dyn LlmClient>,
    model: ModelConfig,
    prompt_set: PromptSet,
    tools: ToolCatalog,
}

impl PromptReasoner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: ModelConfig,
        prompt_set: PromptSet,
        tools: ToolCatalog,
    ) -> Self {
        Self {
            client,
            model,
            prompt_set,
            tools,
        }
    }

    pub fn system_prompt(&self, request: &ReasoningRequest) -> Result<String> {
        match request.variant {
            NodeVariant::Decision => Ok(format!(
                "{}\n{}",
                self.prompt_set.decision_role(),
                self.prompt_set.decision_constraint()
            )),
            NodeVariant::Worker => {
                let mut prompt = format!(
                    "You are a {}. {}\n{}",
                    request.role,
                    self.prompt_set.description(&request.role)?,
                    self.prompt_set.worker_constraint()
                );
                if request.external_tool.is_some() {
                    let _ = write!(
                        prompt,
                        "\nYou have access to an external tool. {}",
                        self.tools.describe(request.external_tool.as_ref())
                    );
                }
                Ok(prompt)
            }
        }
    }

    pub fn user_prompt(&self, request: &ReasoningRequest) -> String {
        let mut prompt = format!("The task is: {}\n", request.task);
        append_peers(
            &mut prompt,
            "At the same time, other agents answered as follows:",
            &request.spatial_inputs,
        );
        append_peers(
            &mut prompt,
            "In the previous round, other agents answered as follows:",
            &request.temporal_inputs,
        );
        if let Some(last) = request.memory.last().filter(|m| !m.outputs.is_empty()) {
            let _ = write!(
                prompt,
                "\nYour own answer in round {} was:\n{}\n",
                last.round,
                last.outputs.join("\n")
            );
        }
        prompt
    }

    /// Model for this request: the node's backend overrides the default model id.
    fn model_for(&self, request: &ReasoningRequest) -> ModelConfig {
        let mut model = self.model.clone();
        if let Some(name) = &request.llm_name {
            model.model_id = name.clone();
        }
        model
    }
}

fn append_peers(prompt: &mut String, header: &str, peers: &[PeerOutput]) {
    let answered: Vec<&PeerOutput> = peers.iter().filter(|p| !p.outputs.is_empty()).collect();
    if answered.is_empty() {
        return;
    }
    let _ = writeln!(prompt, "\n{}", header);
    for peer in answered {
        let _ = writeln!(
            prompt,
            "\nAgent {} ({}):\n{}",
            peer.node_id,
            peer.role,
            peer.outputs.join("\n")
        );
    }
}

impl Reasoner for PromptReasoner {
    fn generate(&self, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let messages = vec![
                ChatMessage::system(self.system_prompt(&request)?),
                ChatMessage::user(self.user_prompt(&request)),
            ];
            let model = self.model_for(&request);
            debug!(node = %request.node_id, model = %model.model_id, round = request.round, "Requesting completion");
            self.client.chat(&model, messages).await
        })
    }
}
