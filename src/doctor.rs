use std::path::Path;
use std::sync::Arc;

use meshwork_core::config::AppConfig;
use meshwork_core::types::EdgeKind;
use meshwork_graph::{ConfigurationGroups, Graph, MaskSnapshot};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig, config_path: &Path) {
    let checks = vec![
        check_api_key(config),
        check_groups(config, config_path),
        check_masks(config, config_path),
        check_journal(config, config_path),
        check_graph(config, config_path),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_api_key(config: &AppConfig) -> CheckResult {
    let has_key = config
        .model
        .api_key
        .as_ref()
        .is_some_and(|k| !k.is_empty() && !k.starts_with("${"));
    // local OpenAI-compatible servers usually take no key
    let local = config
        .model
        .base_url
        .as_deref()
        .is_some_and(|u| u.contains("localhost") || u.contains("127.0.0.1"));

    CheckResult {
        label: "API Key".into(),
        ok: has_key || local,
        detail: if has_key || local {
            format!("Configured for {} ({})", config.model.model_id, config.model.provider)
        } else {
            format!("No API key set for model '{}'", config.model.model_id)
        },
    }
}

fn check_groups(config: &AppConfig, config_path: &Path) -> CheckResult {
    let Some(file) = &config.graph.node_config_file else {
        return CheckResult {
            label: "Groups".into(),
            ok: true,
            detail: format!("Default roles over {} agents", config.graph.agents),
        };
    };
    let path = AppConfig::resolve_path(config_path, file);
    match ConfigurationGroups::load(&path, config.graph.agents) {
        Ok(groups) => CheckResult {
            label: "Groups".into(),
            ok: true,
            detail: format!("{} groups in {}", groups.len(), path.display()),
        },
        Err(e) => CheckResult {
            label: "Groups".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn check_masks(config: &AppConfig, config_path: &Path) -> CheckResult {
    let Some(path) = Graph::mask_path(config, config_path) else {
        return CheckResult {
            label: "Masks".into(),
            ok: true,
            detail: "No mask_file; pruning is not persisted".into(),
        };
    };
    match MaskSnapshot::load_optional(&path) {
        Ok(None) => CheckResult {
            label: "Masks".into(),
            ok: true,
            detail: format!("{} (not created yet)", path.display()),
        },
        Ok(Some(snapshot)) => match snapshot.check(config.graph.agents) {
            Ok(()) => CheckResult {
                label: "Masks".into(),
                ok: true,
                detail: format!(
                    "{} prunes, {} spatial / {} temporal open",
                    snapshot.prunes,
                    snapshot.open_edges(EdgeKind::Spatial),
                    snapshot.open_edges(EdgeKind::Temporal)
                ),
            },
            Err(e) => CheckResult {
                label: "Masks".into(),
                ok: false,
                detail: e.to_string(),
            },
        },
        Err(e) => CheckResult {
            label: "Masks".into(),
            ok: false,
            detail: format!("{}: {}", path.display(), e),
        },
    }
}

fn check_journal(config: &AppConfig, config_path: &Path) -> CheckResult {
    let Some(journal) = config.journal.as_ref().filter(|j| j.enabled) else {
        return CheckResult {
            label: "Journal".into(),
            ok: true,
            detail: "Disabled".into(),
        };
    };
    let dir = AppConfig::resolve_path(config_path, &journal.dir);
    if let Err(e) = std::fs::create_dir_all(&dir) {
        return CheckResult {
            label: "Journal".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", dir.display(), e),
        };
    }
    let test_file = dir.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Journal".into(),
                ok: true,
                detail: format!("{}", dir.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Journal".into(),
            ok: false,
            detail: format!("{} (not writable: {})", dir.display(), e),
        },
    }
}

fn check_graph(config: &AppConfig, config_path: &Path) -> CheckResult {
    let client = meshwork_llm::create_client(&config.model);
    match Graph::from_config(config, config_path, Arc::from(client)) {
        Ok(graph) => CheckResult {
            label: "Graph".into(),
            ok: true,
            detail: format!(
                "{} agents, spatial {} / temporal {} ({} / {} open)",
                graph.agents(),
                mode(graph.spatial().is_optimized()),
                mode(graph.temporal().is_optimized()),
                graph.spatial().open_count(),
                graph.temporal().open_count()
            ),
        },
        Err(e) => CheckResult {
            label: "Graph".into(),
            ok: false,
            detail: e.to_string(),
        },
    }
}

fn mode(optimized: bool) -> &'static str {
    if optimized {
        "learned"
    } else {
        "static"
    }
}
