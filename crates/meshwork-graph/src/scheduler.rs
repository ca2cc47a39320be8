use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, error, warn};

use meshwork_core::config::{DecisionPolicy, RunConfig};
use meshwork_core::error::{MeshworkError, Result};
use meshwork_core::traits::Reasoner;
use meshwork_core::types::{EdgeKind, RoundReport};

use crate::node::NodeArena;

/// Per-run knobs, usually derived from `[run]` in the config file.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub num_rounds: usize,
    pub max_tries: usize,
    pub max_time: Duration,
    pub temperature: f64,
    pub threshold: Option<f64>,
    pub decision_policy: DecisionPolicy,
}

impl RunOptions {
    pub fn with_rounds(mut self, num_rounds: usize) -> Self {
        self.num_rounds = num_rounds;
        self
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_max_time(mut self, max_time: Duration) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_decision_policy(mut self, policy: DecisionPolicy) -> Self {
        self.decision_policy = policy;
        self
    }
}

impl From<&RunConfig> for RunOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            num_rounds: config.num_rounds,
            max_tries: config.max_tries,
            max_time: config.max_time(),
            temperature: config.temperature,
            threshold: config.threshold,
            decision_policy: config.decision_policy,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

/// How node executions are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Driven to completion on the calling thread; no per-attempt timeout.
    Blocking,
    /// Awaited on the async runtime; each attempt is bounded by `timeout`.
    Suspending { timeout: Duration },
}

/// Run one node with up to `max_tries` attempts. Returns the last error
/// once the budget is spent; the node's outputs are left as they were.
pub(crate) async fn execute_with_retry(
    arena: &mut NodeArena,
    idx: usize,
    task: &str,
    round: usize,
    reasoner: &dyn Reasoner,
    max_tries: usize,
    mode: ExecutionMode,
) -> Result<()> {
    let node_id = arena.node(idx).id().to_string();
    let mut last_err = None;

    for attempt in 1..=max_tries {
        let request = arena.request_for(idx, task, round);
        let node = arena.node_mut(idx);
        let result = match mode {
            ExecutionMode::Blocking => node.execute(request, reasoner).await,
            ExecutionMode::Suspending { timeout } => {
                match tokio::time::timeout(timeout, node.execute(request, reasoner)).await {
                    Ok(result) => result,
                    Err(_) => Err(MeshworkError::NodeTimeout {
                        node: node_id.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            }
        };

        match result {
            Ok(_) => return Ok(()),
            Err(e) if e.is_recoverable() => {
                warn!(node = %node_id, attempt, max_tries, error = %e, "Node attempt failed");
                last_err = Some(e);
            }
            Err(e) => {
                error!(node = %node_id, attempt, error = %e, "Node attempt failed on a non-recoverable error");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| MeshworkError::NodeExecution {
        node: node_id,
        message: "no attempts allowed".into(),
    }))
}

/// Execute every worker once in dependency order over the realized spatial
/// edges, then append outputs to memory.
///
/// In-degrees count worker predecessors only. The ready queue is FIFO and
/// seeded with the in-degree-0 workers in arena order. Failed nodes still
/// release their successors.
pub(crate) async fn drain_round(
    arena: &mut NodeArena,
    reasoner: &dyn Reasoner,
    task: &str,
    round: usize,
    options: &RunOptions,
    mode: ExecutionMode,
) -> RoundReport {
    let workers = arena.worker_count();
    let mut in_degree: Vec<usize> = (0..workers)
        .map(|i| {
            arena
                .node(i)
                .predecessors(EdgeKind::Spatial)
                .iter()
                .filter(|&&p| p < workers)
                .count()
        })
        .collect();
    let mut ready: VecDeque<usize> = (0..workers).filter(|&i| in_degree[i] == 0).collect();
    let mut report = RoundReport {
        round,
        ..Default::default()
    };

    while let Some(idx) = ready.pop_front() {
        let node_id = arena.node(idx).id().to_string();
        debug!(node = %node_id, role = %arena.node(idx).role(), round, "Executing node");

        if let Err(e) =
            execute_with_retry(arena, idx, task, round, reasoner, options.max_tries, mode).await
        {
            error!(node = %node_id, max_tries = options.max_tries, error = %e, "Node exhausted retry budget");
            report.failed.push(node_id.clone());
        }
        report.executed.push(node_id);

        for &succ in arena.node(idx).successors(EdgeKind::Spatial) {
            if succ >= workers {
                continue;
            }
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                ready.push_back(succ);
            }
        }
    }

    if report.executed.len() != workers {
        warn!(
            executed = report.executed.len(),
            workers, round, "Not every worker was scheduled this round"
        );
    }

    arena.update_memory(round);
    report
}
