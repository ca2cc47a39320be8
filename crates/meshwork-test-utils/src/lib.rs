//! Mocks and fixtures shared by the meshwork test suites.

use std::collections::{HashSet, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;

use meshwork_core::config::ModelConfig;
use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::{LlmClient, Reasoner};
use meshwork_core::types::{ChatMessage, NodeVariant, ReasoningRequest};

type ReplyFn = dyn Fn(&ReasoningRequest) -> String + Send + Sync;

/// Shared record of every request a [`MockReasoner`] received, in call order.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<ReasoningRequest>>>);

impl CallLog {
    pub fn requests(&self) -> Vec<ReasoningRequest> {
        self.0.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Node ids in call order, retries included.
    pub fn order(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.node_id).collect()
    }

    /// Roles in call order, retries included.
    pub fn roles(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.role).collect()
    }

    pub fn count_for_role(&self, role: &str) -> usize {
        self.requests().iter().filter(|r| r.role == role).count()
    }

    pub fn decision_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.variant == NodeVariant::Decision)
            .count()
    }

    pub fn len(&self) -> usize {
        self.0.lock().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, request: ReasoningRequest) {
        if let Ok(mut v) = self.0.lock() {
            v.push(request);
        }
    }
}

/// Scripted reasoner: answers `"{role}@{round}"` unless told otherwise.
pub struct MockReasoner {
    log: CallLog,
    failing_roles: HashSet<String>,
    fail_decision: bool,
    empty_decision: bool,
    delays: Vec<(String, Duration)>,
    reply: Option<Box<ReplyFn>>,
}

impl MockReasoner {
    pub fn new() -> Self {
        Self {
            log: CallLog::default(),
            failing_roles: HashSet::new(),
            fail_decision: false,
            empty_decision: false,
            delays: vec![],
            reply: None,
        }
    }

    /// Every worker with this role fails on every attempt.
    pub fn failing_role(mut self, role: impl Into<String>) -> Self {
        self.failing_roles.insert(role.into());
        self
    }

    /// The decision node fails on every attempt.
    pub fn failing_decision(mut self) -> Self {
        self.fail_decision = true;
        self
    }

    /// The decision node answers with an empty string.
    pub fn empty_decision(mut self) -> Self {
        self.empty_decision = true;
        self
    }

    /// Workers with this role sleep before answering. Needs a tokio runtime.
    pub fn with_delay(mut self, role: impl Into<String>, delay: Duration) -> Self {
        self.delays.push((role.into(), delay));
        self
    }

    pub fn with_reply(
        mut self,
        reply: impl Fn(&ReasoningRequest) -> String + Send + Sync + 'static,
    ) -> Self {
        self.reply = Some(Box::new(reply));
        self
    }

    pub fn calls(&self) -> CallLog {
        self.log.clone()
    }
}

impl Default for MockReasoner {
    fn default() -> Self {
        Self::new()
    }
}

impl Reasoner for MockReasoner {
    fn generate(&self, request: ReasoningRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.log.push(request.clone());

            let delay = self
                .delays
                .iter()
                .find(|(role, _)| *role == request.role)
                .map(|(_, d)| *d);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let is_decision = request.variant == NodeVariant::Decision;
            if (is_decision && self.fail_decision)
                || (!is_decision && self.failing_roles.contains(&request.role))
            {
                return Err(MeshworkError::NodeExecution {
                    node: request.node_id.clone(),
                    message: "scripted failure".into(),
                });
            }
            if is_decision && self.empty_decision {
                return Ok(String::new());
            }

            Ok(match &self.reply {
                Some(reply) => reply(&request),
                None => format!("{}@{}", request.role, request.round),
            })
        })
    }
}

/// Scripted LLM client: pops one result per call.
pub struct MockLlm {
    script: Mutex<VecDeque<Result<String>>>,
    calls: Arc<AtomicUsize>,
}

impl MockLlm {
    pub fn new(script: Vec<Result<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers with the same text.
    pub fn constant(text: &str) -> Self {
        Self::new((0..64).map(|_| Ok(text.to_string())).collect())
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl LlmClient for MockLlm {
    fn chat(
        &self,
        _config: &ModelConfig,
        _messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .ok()
                .and_then(|mut s| s.pop_front())
                .unwrap_or_else(|| Err(MeshworkError::LlmRequest("mock script exhausted".into())))
        })
    }
}

/// Minimal model config for tests.
pub fn model_config(model_id: &str) -> ModelConfig {
    ModelConfig {
        provider: "openai".into(),
        model_id: model_id.into(),
        api_key: Some("sk-test".into()),
        base_url: None,
        max_tokens: 256,
        temperature: 0.0,
        retry: None,
    }
}

/// Write `content` to a temp file with the given suffix and keep it alive.
pub fn temp_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut tmp = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    tmp.write_all(content.as_bytes()).expect("write temp file");
    tmp
}

/// Node-configuration JSON with two groups of three slots each.
pub fn two_group_nodes_json() -> serde_json::Value {
    serde_json::json!({
        "group_1": [
            {"role": "Knowledgeable Expert"},
            {"role": "Critic", "llm_name": "deepseek-chat"},
            {"role": "Mathematician"}
        ],
        "group_2": [
            {"role": "Searcher", "external_tool": {"type": "Search", "mode": "web", "source": "Arxiv"}},
            {"role": "Historian"},
            {"role": "Economist", "external_tool": {"type": "RAG", "mode": "hybrid", "source": "Wikipedia"}}
        ]
    })
}
