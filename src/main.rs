//! # Company Research Agent
//!
//! Prepares a sales team for a first meeting with a company. A planner agent
//! splits the research into topics, an analyst researches each topic with web
//! search, an account executive reviews the findings (up to three rounds per
//! topic) and a reporter writes the final sales readiness report.
//!
//! Every step is checkpointed, so an interrupted run can be resumed.
//!
//! ## Quick Start
//! ```bash
//! company-research run "Salesforce"
//! company-research status --run-id salesforce-1718000000
//! company-research resume --run-id salesforce-1718000000
//! ```

mod agent;
mod config;
mod prompts;
mod publish;
mod tools;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use research_flow::{
    create_checkpointer, Checkpointer, CheckpointerConfig, FlowEngine, FlowError,
    PublishCapability, RunOutcome,
};

use crate::agent::{
    OllamaAccountExecutive, OllamaAnalyst, OllamaBackend, OllamaPlanner, OllamaReporter,
};
use crate::config::{CheckpointBackend, Config};
use crate::publish::{slug, MarkdownPublisher, NotionPublisher};

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "company-research",
    version,
    about = "Researches a company with local LLM agents and writes a sales readiness report",
    long_about = r#"
Company Research Agent - sales readiness reports from local LLMs.

A run plans research topics for a company, researches each topic with web
search, has every topic reviewed (at most three rounds) and writes a report.
The report is published to Notion when NOTION_API_KEY and
NOTION_PARENT_PAGE_ID are set, otherwise written to REPORT_OUTPUT_DIR.

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

EXAMPLES:
  company-research run "Salesforce"
  company-research run "Salesforce" --run-id sfdc-q3 --model qwen2.5
  company-research status --run-id sfdc-q3
  company-research resume --run-id sfdc-q3
"#
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", global = true, default_value = "false")]
    verbose: bool,

    /// Base directory for run checkpoints (overrides CHECKPOINT_DIR)
    #[arg(long = "checkpoint-dir", global = true, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new research run
    Run {
        /// Company to research
        #[arg(value_name = "COMPANY")]
        company: String,

        /// Run id (defaults to a slug of the company plus a timestamp)
        #[arg(long = "run-id")]
        run_id: Option<String>,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Resume a run from its latest checkpoint
    Resume {
        #[arg(long = "run-id")]
        run_id: String,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Show the checkpointed progress of a run
    Status {
        #[arg(long = "run-id")]
        run_id: String,
    },
}

#[derive(clap::Args, Debug)]
struct AgentArgs {
    /// The Ollama model to use (overrides OLLAMA_MODEL env var)
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Keep the report local; skip publishing
    #[arg(long = "no-publish", default_value = "false")]
    no_publish: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    init_logging(args.verbose, &config.log_level)?;

    if let Some(dir) = args.checkpoint_dir {
        config.checkpoint_dir = dir;
    }

    match args.command {
        Command::Run {
            company,
            run_id,
            agent,
        } => {
            apply_agent_args(&mut config, &agent)?;
            let run_id = run_id.unwrap_or_else(|| default_run_id(&company));
            let engine = build_engine(&config, &run_id, agent.no_publish).await?;

            info!(run_id = %run_id, company = %company, model = %config.model, "Starting run");
            report_result(engine.run(&company).await)
        }

        Command::Resume { run_id, agent } => {
            apply_agent_args(&mut config, &agent)?;
            let engine = build_engine(&config, &run_id, agent.no_publish).await?;

            match engine.resume().await {
                Ok(None) => anyhow::bail!("No checkpoints found for run '{}'", run_id),
                Ok(Some(outcome)) => report_result(Ok(outcome)),
                Err(e) => report_result(Err(e)),
            }
        }

        Command::Status { run_id } => print_status(&config, &run_id).await,
    }
}

fn apply_agent_args(config: &mut Config, agent: &AgentArgs) -> Result<()> {
    if let Some(model) = &agent.model {
        info!(model = %model, "Using model from command line");
        config.model = model.clone();
    }
    config.validate()
}

fn default_run_id(company: &str) -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("{}-{}", slug(company), secs)
}

/// SQLite database file inside the checkpoint directory
#[cfg(feature = "checkpointer-sqlite")]
const CHECKPOINT_DB_FILE: &str = "checkpoints.db";

fn checkpointer_config(config: &Config) -> Result<CheckpointerConfig> {
    match config.checkpoint_backend {
        CheckpointBackend::File => Ok(CheckpointerConfig::File {
            path: config.checkpoint_dir.clone(),
            compression: config.checkpoint_compression,
        }),

        #[cfg(feature = "checkpointer-sqlite")]
        CheckpointBackend::Sqlite => Ok(CheckpointerConfig::Sqlite {
            path: config
                .checkpoint_dir
                .join(CHECKPOINT_DB_FILE)
                .to_string_lossy()
                .into_owned(),
            compression: config.checkpoint_compression,
        }),

        #[cfg(not(feature = "checkpointer-sqlite"))]
        CheckpointBackend::Sqlite => {
            anyhow::bail!("CHECKPOINT_BACKEND=sqlite requires building with --features checkpointer-sqlite")
        }
    }
}

async fn open_checkpointer(config: &Config, run_id: &str) -> Result<Arc<dyn Checkpointer>> {
    let checkpoint_config = checkpointer_config(config)?;
    if config.checkpoint_backend == CheckpointBackend::Sqlite {
        tokio::fs::create_dir_all(&config.checkpoint_dir)
            .await
            .context("Failed to create checkpoint directory")?;
    }
    info!(
        backend = ?config.checkpoint_backend,
        dir = %config.checkpoint_dir.display(),
        "Opening checkpoint store"
    );

    create_checkpointer(checkpoint_config, run_id)
        .await
        .context("Failed to open checkpoint store")
}

async fn build_engine(config: &Config, run_id: &str, no_publish: bool) -> Result<FlowEngine> {
    let backend = Arc::new(OllamaBackend::new(config));

    let mut builder = FlowEngine::builder()
        .planning(Arc::new(OllamaPlanner::new(backend.clone())))
        .research(Arc::new(OllamaAnalyst::new(backend.clone())))
        .review(Arc::new(OllamaAccountExecutive::new(backend.clone())))
        .reporting(Arc::new(OllamaReporter::new(backend)))
        .checkpointer(open_checkpointer(config, run_id).await?)
        .max_steps(config.max_flow_steps);

    if let Some(publisher) = publisher(config, no_publish) {
        builder = builder.publisher(publisher);
    }

    builder.build().context("Failed to build research flow")
}

fn publisher(config: &Config, no_publish: bool) -> Option<Arc<dyn PublishCapability>> {
    if no_publish {
        info!("Publishing disabled");
        return None;
    }

    match config.notion() {
        Some((api_key, parent_page_id)) => {
            info!("Publishing reports to Notion");
            Some(Arc::new(NotionPublisher::new(api_key, parent_page_id)))
        }
        None => {
            info!(dir = %config.report_output_dir.display(), "Writing reports to disk");
            Some(Arc::new(MarkdownPublisher::new(&config.report_output_dir)))
        }
    }
}

// =============================================================================
// OUTPUT
// =============================================================================
fn report_result(result: std::result::Result<RunOutcome, FlowError>) -> Result<()> {
    match result {
        Ok(outcome) => {
            println!("\n{}", "=".repeat(60));
            println!("SALES READINESS REPORT ({})", outcome.run_id);
            println!("{}\n", "=".repeat(60));
            println!("{}", outcome.report);
            println!("\n{}", "=".repeat(60));

            for warning in &outcome.warnings {
                eprintln!("{}", warning);
            }
            if let Some(page_id) = &outcome.page_id {
                println!("Published: {}", page_id);
            }

            info!(
                run_id = %outcome.run_id,
                steps = outcome.steps,
                tasks = outcome.state.completed_tasks.len(),
                "Research completed successfully"
            );
            Ok(())
        }
        Err(e) => {
            error!(kind = %e.kind(), error = %e, "Research failed");
            eprintln!("\nResearch failed [{}]: {}", e.kind(), e);

            let text = e.to_string();
            if text.contains("connect") {
                eprintln!("\nTip: Make sure Ollama is running:");
                eprintln!("   ollama serve");
            } else if text.contains("model") {
                eprintln!("\nTip: Make sure the model is installed:");
                eprintln!("   ollama pull llama3.2");
            }

            Err(e.into())
        }
    }
}

async fn print_status(config: &Config, run_id: &str) -> Result<()> {
    let checkpointer = open_checkpointer(config, run_id).await?;
    let Some(checkpoint) = checkpointer
        .latest()
        .await
        .context("Failed to load checkpoint")?
    else {
        anyhow::bail!("No checkpoints found for run '{}'", run_id);
    };

    let state = &checkpoint.state;
    let (done, total) = state.progress();

    println!("Run:      {}", checkpoint.run_id);
    println!("Company:  {}", state.company_name);
    println!("Step:     {} (next: {})", checkpoint.step, checkpoint.next);
    println!("Saved:    {}", checkpoint.timestamp.to_rfc3339());
    println!("Progress: {}/{} tasks", done, total);
    println!("Report:   {}", if state.report.is_some() { "yes" } else { "no" });

    if let Some(plan) = &state.plan {
        println!();
        for task in &plan.tasks {
            let (status, feedback_count) = if let Some(done) =
                state.completed_tasks.iter().find(|t| t.task_id == task.task_id)
            {
                ("done", done.feedback_count)
            } else if let Some(current) = state
                .current_task
                .as_ref()
                .filter(|t| t.task_id == task.task_id)
            {
                ("current", current.feedback_count)
            } else {
                ("pending", task.feedback_count)
            };
            println!("  [{:<7}] {} (reviews: {})", status, task.topic, feedback_count);
        }
    }

    Ok(())
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// `--verbose` forces debug level; otherwise RUST_LOG directives apply when set.
fn init_logging(verbose: bool, log_level: &str) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_target(true)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    let result = if verbose {
        tracing::subscriber::set_global_default(builder.with_max_level(Level::DEBUG).finish())
    } else {
        let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
        tracing::subscriber::set_global_default(builder.with_env_filter(filter).finish())
    };

    result.map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))
}
