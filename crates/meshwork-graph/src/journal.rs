use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use meshwork_core::error::Result;
use meshwork_core::types::RunOutput;

use crate::pruner::PruneOutcome;

/// Append-only JSONL journal, one line per run or prune pass.
///
/// Lines land in `{dir}/{graph_id}.jsonl` and are flushed as they are written.
pub struct RunJournal {
    path: PathBuf,
    graph_id: String,
}

#[derive(Serialize)]
struct JournalEntry<'a> {
    timestamp: String,
    graph_id: &'a str,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    task: Option<&'a str>,
    detail: serde_json::Value,
}

impl RunJournal {
    pub fn new(dir: &Path, graph_id: impl Into<String>) -> Self {
        let graph_id = graph_id.into();
        Self {
            path: dir.join(format!("{}.jsonl", graph_id)),
            graph_id,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn record_run(&self, task: &str, output: &RunOutput) -> Result<()> {
        let detail = serde_json::json!({
            "group": output.group,
            "final_answers": output.final_answers,
            "log_probability": output.log_probability,
            "rounds": output.rounds,
        });
        self.append("run_complete", Some(task), detail).await
    }

    pub async fn record_prune(&self, outcomes: &[PruneOutcome]) -> Result<()> {
        self.append("prune", None, serde_json::json!({ "outcomes": outcomes }))
            .await
    }

    async fn append(
        &self,
        event_type: &'static str,
        task: Option<&str>,
        detail: serde_json::Value,
    ) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let entry = JournalEntry {
            timestamp: Utc::now().to_rfc3339(),
            graph_id: &self.graph_id,
            event_type,
            task,
            detail,
        };
        let line = format!("{}\n", serde_json::to_string(&entry)?);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        debug!(path = %self.path.display(), event_type, "Journal entry written");
        Ok(())
    }
}
