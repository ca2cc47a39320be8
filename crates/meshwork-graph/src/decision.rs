use tracing::{error, info, warn};

use meshwork_core::config::DecisionPolicy;
use meshwork_core::error::Result;
use meshwork_core::traits::Reasoner;
use meshwork_core::types::{EdgeKind, NO_ANSWER};

use crate::node::NodeArena;
use crate::scheduler::{execute_with_retry, ExecutionMode, RunOptions};

/// Wire every worker into the decision node.
pub(crate) fn connect_decision_node(arena: &mut NodeArena) {
    let decision = arena.decision_index();
    for worker in 0..arena.worker_count() {
        arena.add_successor(worker, decision, EdgeKind::Spatial);
    }
}

/// Execute the decision node once and return the final answers.
///
/// Under [`DecisionPolicy::Retry`] failures are absorbed like a worker's;
/// under [`DecisionPolicy::SingleAttempt`] the error is returned. An empty
/// result becomes a single [`NO_ANSWER`].
pub(crate) async fn aggregate(
    arena: &mut NodeArena,
    reasoner: &dyn Reasoner,
    task: &str,
    round: usize,
    options: &RunOptions,
    mode: ExecutionMode,
) -> Result<Vec<String>> {
    connect_decision_node(arena);
    let decision = arena.decision_index();

    match options.decision_policy {
        DecisionPolicy::Retry => {
            if let Err(e) =
                execute_with_retry(arena, decision, task, round, reasoner, options.max_tries, mode)
                    .await
            {
                error!(error = %e, "Decision node failed");
            }
        }
        DecisionPolicy::SingleAttempt => {
            let request = arena.request_for(decision, task, round);
            arena.node_mut(decision).execute(request, reasoner).await?;
        }
    }

    let answers = arena.decision().outputs().to_vec();
    if answers.is_empty() {
        warn!("Decision node produced no answer");
        return Ok(vec![NO_ANSWER.to_string()]);
    }
    info!(answers = answers.len(), "Decision reached");
    Ok(answers)
}
