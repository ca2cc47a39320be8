use std::io::Write;
use std::sync::Arc;

use meshwork_core::config::{AppConfig, DecisionPolicy, RetryConfig};
use meshwork_core::types::{NodeVariant, Topology, NO_ANSWER};
use meshwork_core::MeshworkError;
use meshwork_graph::{Graph, MaskSnapshot, RunOptions};
use meshwork_test_utils::{model_config, two_group_nodes_json, MockLlm, MockReasoner};

fn static_graph(agents: usize, reasoner: MockReasoner) -> Graph {
    Graph::builder(agents)
        .reasoner(Arc::new(reasoner))
        .seed(7)
        .build()
        .expect("build graph")
}

#[tokio::test]
async fn test_full_static_round_runs_every_worker_once() {
    let reasoner = MockReasoner::new();
    let log = reasoner.calls();
    let mut graph = static_graph(3, reasoner);

    let out = graph
        .arun("What is 2 + 2?", &RunOptions::default(), None)
        .await
        .expect("run");

    let requests = log.requests();
    assert_eq!(requests.len(), 4);
    assert_eq!(log.decision_calls(), 1);
    assert_eq!(requests[3].variant, NodeVariant::Decision);

    // full connectivity realizes 0 -> 1 -> 2 plus 0 -> 2; later reverse edges close cycles
    let workers = graph.arena().worker_ids();
    assert_eq!(log.order()[..3], workers[..]);
    assert_eq!(requests[2].spatial_inputs.len(), 2);
    assert!(requests[0].spatial_inputs.is_empty());

    assert_eq!(out.rounds.len(), 1);
    assert_eq!(out.rounds[0].executed, workers);
    assert_eq!(out.final_answers.len(), 1);
    assert_eq!(graph.num_edges(), 3);
}

#[tokio::test]
async fn test_failing_worker_is_bounded_and_run_completes() {
    let reasoner = MockReasoner::new().failing_role("Critic");
    let log = reasoner.calls();
    let mut graph = static_graph(3, reasoner);
    let options = RunOptions::default().with_max_tries(2);

    let out = graph.arun("q", &options, None).await.expect("run");

    assert_eq!(log.count_for_role("Critic"), 2);
    assert_eq!(out.rounds[0].failed.len(), 1);
    assert_eq!(out.rounds[0].executed.len(), 3);
    assert_eq!(out.final_answers, vec!["Decision Maker@1".to_string()]);
}

#[tokio::test]
async fn test_decision_failure_policies() {
    let mut graph = static_graph(2, MockReasoner::new().failing_decision());
    let out = graph.arun("q", &RunOptions::default(), None).await.expect("run");
    assert_eq!(out.final_answers, vec![NO_ANSWER.to_string()]);

    let options = RunOptions::default().with_decision_policy(DecisionPolicy::SingleAttempt);
    let err = graph.arun("q", &options, None).await.unwrap_err();
    assert!(matches!(err, MeshworkError::NodeExecution { .. }));
}

#[tokio::test]
async fn test_memory_and_temporal_inputs_across_rounds() {
    let reasoner = MockReasoner::new();
    let log = reasoner.calls();
    let mut graph = static_graph(3, reasoner);
    let options = RunOptions::default().with_rounds(2);

    let out = graph.arun("q", &options, None).await.expect("run");
    assert_eq!(out.rounds.len(), 2);

    let workers: Vec<_> = log
        .requests()
        .into_iter()
        .filter(|r| r.variant == NodeVariant::Worker)
        .collect();
    assert_eq!(workers.len(), 6);

    for req in workers.iter().filter(|r| r.round == 0) {
        assert!(req.temporal_inputs.is_empty());
        assert!(req.memory.is_empty());
    }
    let second: Vec<_> = workers.iter().filter(|r| r.round == 1).collect();
    assert!(second.iter().all(|r| r.memory.len() == 1));
    assert!(second.iter().any(|r| !r.temporal_inputs.is_empty()));
    assert!(second
        .iter()
        .flat_map(|r| &r.temporal_inputs)
        .all(|p| p.outputs.iter().all(|o| o.ends_with("@0"))));
}

#[test]
fn test_direct_answer_runs_workers_independently() {
    let reasoner = MockReasoner::new();
    let log = reasoner.calls();
    let mut graph = Graph::builder(3)
        .topology(Topology::DirectAnswer, None)
        .reasoner(Arc::new(reasoner))
        .build()
        .expect("build graph");

    graph.run("q", &RunOptions::default(), None).expect("run");
    assert_eq!(graph.num_edges(), 0);
    assert!(log
        .requests()
        .iter()
        .filter(|r| r.variant == NodeVariant::Worker)
        .all(|r| r.spatial_inputs.is_empty()));
}

#[tokio::test]
async fn test_pruned_masks_survive_reload_from_config() {
    let dir = tempfile::tempdir().expect("temp dir");
    std::fs::write(
        dir.path().join("nodes.json"),
        two_group_nodes_json().to_string(),
    )
    .expect("write nodes");

    let config_path = dir.path().join("meshwork.toml");
    let mut file = std::fs::File::create(&config_path).expect("create config");
    file.write_all(
        br#"
[graph]
agents = 3
optimized_spatial = true
node_config_file = "nodes.json"
mask_file = "state/masks.json"
seed = 11

[model]
model_id = "gpt-4o-mini"
"#,
    )
    .expect("write config");

    let config = AppConfig::load(&config_path).expect("load config");
    let client = Arc::new(MockLlm::constant("B"));
    let mut graph = Graph::from_config(&config, &config_path, client).expect("build graph");
    assert_eq!(graph.groups().len(), 2);

    let out = graph.arun("q", &RunOptions::default(), None).await.expect("run");
    assert_eq!(out.final_answers, vec!["B".to_string()]);

    let outcomes = graph.update_masks(0.5).expect("prune");
    assert_eq!(outcomes[0].pruned, 3);
    assert_eq!(outcomes[0].remaining, 3);
    assert!(outcomes[1].skipped);

    let mask_path = Graph::mask_path(&config, &config_path).expect("mask path");
    graph.snapshot().save(&mask_path).expect("save masks");

    let reloaded = Graph::from_config(&config, &config_path, Arc::new(MockLlm::constant("B")))
        .expect("rebuild graph");
    assert_eq!(reloaded.spatial().masks(), graph.spatial().masks());
    assert_eq!(reloaded.prunes(), 1);

    let saved = MaskSnapshot::load(&mask_path).expect("load masks");
    assert_eq!(saved.open_edges(meshwork_core::types::EdgeKind::Spatial), 3);
}

#[test]
fn test_blocking_run_over_http_client_absorbs_failures() {
    // nothing listens on the discard port, so every request fails fast
    let mut model = model_config("gpt-4o-mini");
    model.base_url = Some("http://127.0.0.1:9/v1/chat/completions".into());
    model.retry = Some(RetryConfig {
        max_retries: 0,
        initial_backoff_ms: 1,
        max_backoff_ms: 1,
    });
    let client = meshwork_llm::create_retrying_client(&model, &[]);
    let mut graph = Graph::builder(2)
        .llm(Arc::new(client), model)
        .build()
        .expect("build graph");

    let options = RunOptions::default().with_max_tries(1);
    let out = graph.run("q", &options, None).expect("run");
    assert_eq!(out.rounds[0].failed.len(), 2);
    assert_eq!(out.final_answers, vec![NO_ANSWER.to_string()]);
}
