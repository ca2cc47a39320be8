mod doctor;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use meshwork_core::config::AppConfig;
use meshwork_core::types::{EdgeKind, RunOutput};
use meshwork_graph::{Graph, MaskSnapshot, RunJournal, RunOptions};

#[derive(Parser)]
#[command(name = "meshwork", version, about = "Dynamic multi-agent graph runner")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "meshwork.toml", env = "MESHWORK_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one task through the graph
    Run {
        /// Override the configured number of rounds
        #[arg(long)]
        rounds: Option<usize>,
        /// Use this configuration group instead of a random one
        #[arg(long)]
        group: Option<String>,
        /// Print the full run output as JSON
        #[arg(long)]
        json: bool,
        /// The task text
        #[arg(trailing_var_arg = true, required = true)]
        task: Vec<String>,
    },
    /// Run every line of a file as a task, pruning masks as configured
    Batch {
        /// File with one task per line
        file: PathBuf,
        #[arg(long)]
        group: Option<String>,
        /// Do not prune or save masks
        #[arg(long)]
        no_prune: bool,
    },
    /// List configuration groups
    Groups,
    /// Show the current edge masks
    Masks,
    /// Check configuration and environment
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("meshwork=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    info!(path = %cli.config.display(), "Loaded config");

    match cli.command {
        Commands::Check => {
            doctor::run_doctor(&config, &cli.config);
            Ok(())
        }
        Commands::Groups => {
            let graph = build_graph(&config, &cli.config)?;
            print_groups(&graph);
            Ok(())
        }
        Commands::Masks => {
            let graph = build_graph(&config, &cli.config)?;
            print_masks(&graph.snapshot());
            Ok(())
        }
        Commands::Run {
            rounds,
            group,
            json,
            task,
        } => {
            let mut graph = build_graph(&config, &cli.config)?;
            let journal = open_journal(&config, &cli.config, &graph);
            let mut options = RunOptions::from(&config.run);
            if let Some(rounds) = rounds {
                options = options.with_rounds(rounds);
            }
            let task = task.join(" ");

            let output = graph.arun(&task, &options, group.as_deref()).await?;
            if let Some(journal) = &journal {
                if let Err(e) = journal.record_run(&task, &output).await {
                    warn!(error = %e, "Failed to write run journal");
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_output(&output);
            }
            Ok(())
        }
        Commands::Batch {
            file,
            group,
            no_prune,
        } => run_batch(&config, &cli.config, &file, group.as_deref(), no_prune).await,
    }
}

fn build_graph(config: &AppConfig, config_path: &Path) -> anyhow::Result<Graph> {
    let client = meshwork_llm::create_retrying_client(&config.model, &config.fallback_models);
    Ok(Graph::from_config(config, config_path, Arc::new(client))?)
}

fn open_journal(config: &AppConfig, config_path: &Path, graph: &Graph) -> Option<RunJournal> {
    let journal = config.journal.as_ref().filter(|j| j.enabled)?;
    let dir = AppConfig::resolve_path(config_path, &journal.dir);
    Some(RunJournal::new(&dir, graph.id()))
}

async fn run_batch(
    config: &AppConfig,
    config_path: &Path,
    file: &Path,
    group: Option<&str>,
    no_prune: bool,
) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)?;
    let tasks: Vec<&str> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let mut graph = build_graph(config, config_path)?;
    let journal = open_journal(config, config_path, &graph);
    let mask_path = Graph::mask_path(config, config_path);
    let options = RunOptions::from(&config.run);
    let every = config.prune.every.max(1);
    info!(tasks = tasks.len(), every, "Starting batch");

    for (i, task) in tasks.iter().enumerate() {
        let output = graph.arun(task, &options, group).await?;
        println!("[{}/{}] {}", i + 1, tasks.len(), output.final_answers.join(" | "));
        if let Some(journal) = &journal {
            if let Err(e) = journal.record_run(task, &output).await {
                warn!(error = %e, "Failed to write run journal");
            }
        }

        if no_prune || (i + 1) % every != 0 {
            continue;
        }
        let outcomes = graph.update_masks(config.prune.rate)?;
        if outcomes.iter().all(|o| o.skipped) {
            continue;
        }
        if let Some(journal) = &journal {
            if let Err(e) = journal.record_prune(&outcomes).await {
                warn!(error = %e, "Failed to write run journal");
            }
        }
        match &mask_path {
            Some(path) => graph.snapshot().save(path)?,
            None => warn!("Masks pruned but graph.mask_file is not set; not saved"),
        }
    }

    print_masks(&graph.snapshot());
    Ok(())
}

fn print_output(output: &RunOutput) {
    println!("group: {}", output.group);
    for report in &output.rounds {
        let failed = if report.failed.is_empty() {
            String::new()
        } else {
            format!(" (failed: {})", report.failed.join(", "))
        };
        println!(
            "round {}: {}{}",
            report.round,
            report.executed.join(" -> "),
            failed
        );
    }
    println!("log probability: {:.4}", output.log_probability);
    println!();
    for answer in &output.final_answers {
        println!("{}", answer);
    }
}

fn print_groups(graph: &Graph) {
    for group in graph.groups().iter() {
        println!("{}:", group.name);
        for (i, slot) in group.slots.iter().enumerate() {
            let llm = slot.llm_name.as_deref().unwrap_or("default");
            match &slot.external_tool {
                Some(tool) => println!(
                    "  {}. {} [{}] {} {}/{}",
                    i, slot.role, llm, tool.tool_type, tool.mode, tool.source
                ),
                None => println!("  {}. {} [{}]", i, slot.role, llm),
            }
        }
    }
}

fn print_masks(snapshot: &MaskSnapshot) {
    let n = snapshot.agents;
    println!("prune passes: {}", snapshot.prunes);
    for (kind, mask) in [
        (EdgeKind::Spatial, &snapshot.spatial),
        (EdgeKind::Temporal, &snapshot.temporal),
    ] {
        println!(
            "{} ({} of {} open):",
            kind,
            snapshot.open_edges(kind),
            mask.len()
        );
        for row in mask.chunks(n.max(1)) {
            let cells: Vec<String> = row.iter().map(|m| m.to_string()).collect();
            println!("  {}", cells.join(" "));
        }
    }
}
