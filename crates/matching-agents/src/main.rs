use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use matching_agents::{
    EngineConfig, MatchingAgents, OpenAiCompatClient, ResilientCompletion, ScriptedFeedback,
    StoreBackend, WorkflowOrchestrator,
};
use tracing::info;
use workflow_core::{
    CandidateFeedback, CandidateProfile, FileWorkflowStore, JobDescription, SelectionCriteria,
    SharedWorkflowStore,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Iterative LLM-driven candidate matching", long_about = None)]
struct Args {
    /// TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides MATCHING_STORE_DIR)
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,

    /// Model name (overrides MATCHING_MODEL)
    #[arg(long, global = true)]
    model: Option<String>,

    /// Completion endpoint base URL (overrides MATCHING_BASE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Iteration cap before the final round
    #[arg(long, global = true)]
    max_iterations: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage job descriptions
    Job {
        #[command(subcommand)]
        action: JobAction,
    },
    /// Start a workflow for a job from a criteria JSON file
    Init {
        job: String,
        #[arg(long)]
        criteria: PathBuf,
    },
    /// Generate the next candidate batch
    Generate { job: String },
    /// Submit feedback (JSON array) on the latest batch
    Feedback {
        job: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Show workflow state, batches and criteria
    Status {
        job: String,
        /// Print the report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a workflow to completion with scripted feedback
    Run {
        job: String,
        #[arg(long)]
        script: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum JobAction {
    /// Register a job description from a text file
    Add {
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        file: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::load(args.config.as_deref())?;
    if let Some(dir) = &args.store_dir {
        config.store.dir = dir.clone();
    }
    if let Some(model) = &args.model {
        config.model.model = model.clone();
    }
    if let Some(url) = &args.base_url {
        config.model.base_url = url.clone();
    }
    if let Some(max) = args.max_iterations {
        config.workflow.max_iterations = max;
    }
    config.validate()?;
    Ok(config)
}

fn open_store(config: &EngineConfig) -> Result<SharedWorkflowStore> {
    let dir = &config.store.dir;
    match config.store.backend {
        StoreBackend::File => Ok(FileWorkflowStore::open(dir.as_path())
            .with_context(|| format!("opening state directory {}", dir.display()))?
            .shared()),
        #[cfg(feature = "heavy-state")]
        StoreBackend::Rocks => Ok(workflow_core::RocksWorkflowStore::open(dir.as_path())
            .with_context(|| format!("opening RocksDB at {}", dir.display()))?
            .shared()),
        #[cfg(not(feature = "heavy-state"))]
        StoreBackend::Rocks => anyhow::bail!("RocksDB backend requires the heavy-state feature"),
    }
}

fn build_orchestrator(
    config: &EngineConfig,
    store: SharedWorkflowStore,
) -> Result<WorkflowOrchestrator> {
    let client = OpenAiCompatClient::new(
        &config.model.base_url,
        config.model.api_key.clone(),
        config.model.model.clone(),
    )
    .context("building HTTP client")?;
    let completion = ResilientCompletion::new(
        Arc::new(client),
        config.resilience.retry.clone(),
        config.call_timeout(),
        config.resilience.max_concurrent_calls,
    );
    let agents = MatchingAgents::new(Arc::new(completion), &config.model);
    Ok(WorkflowOrchestrator::new(store, agents, config.decider()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

fn print_candidates(candidates: &[CandidateProfile]) {
    for c in candidates {
        println!("{:>5.1}  {}  ({})", c.match_score, c.name, c.id);
        println!("       {}", c.reasoning);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let store = open_store(&config)?;
    info!(
        store = %config.store.dir.display(),
        model = %config.model.model,
        max_iterations = config.workflow.max_iterations,
        "Matching engine starting"
    );
    let orchestrator = build_orchestrator(&config, store)?;

    match args.command {
        Command::Job {
            action: JobAction::Add { id, title, file },
        } => {
            let body = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            orchestrator.register_job(&JobDescription::new(id, title, body))?;
        }
        Command::Init { job, criteria } => {
            let criteria: SelectionCriteria = read_json(&criteria)?;
            let state = orchestrator.initialize(&job, criteria).await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Generate { job } => {
            let state = orchestrator.load_state(&job)?;
            let (candidates, state) = orchestrator.generate(&state).await?;
            println!("Iteration {} ({}):", state.iteration_count, state.current_phase);
            print_candidates(&candidates);
        }
        Command::Feedback { job, file } => {
            let feedback: Vec<CandidateFeedback> = read_json(&file)?;
            let state = orchestrator.load_state(&job)?;
            let state = orchestrator.process_feedback(&state, feedback).await?;
            println!(
                "{}: iteration {}, should_terminate={}",
                state.current_phase, state.iteration_count, state.should_terminate
            );
        }
        Command::Status { job, json } => {
            let report = orchestrator.report(&job)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report.render());
            }
        }
        Command::Run { job, script } => {
            let source = ScriptedFeedback::from_file(&script)?;
            let report = orchestrator.run_to_completion(&job, &source).await?;
            print!("{}", report.render());
        }
    }

    Ok(())
}
