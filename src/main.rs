mod doctor;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use textflow_core::config::AppConfig;
use textflow_core::error::TextflowError;
use textflow_core::event::EventBus;
use textflow_core::traits::{RunHistoryStore, StepProcessor, WorkflowStore};
use textflow_core::types::{NewWorkflow, RunInput, RunRecord, StepDefinition, StepKind, Workflow, WorkflowId};
use textflow_engine::{RunLogger, WorkflowRunner};
use textflow_store::SqliteStore;

#[derive(Parser)]
#[command(name = "textflow", version, about = "Run text through short AI processing pipelines")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "textflow.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve,
    /// Run a stored workflow over some text and exit
    Run {
        /// Workflow id
        workflow_id: String,
        /// Input text (read from stdin when omitted)
        #[arg(trailing_var_arg = true)]
        text: Vec<String>,
    },
    /// Manage workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },
    /// Show recent runs
    History {
        /// Number of runs to show (default: gateway.default_history_limit)
        #[arg(long)]
        limit: Option<usize>,
        /// Only runs of this workflow
        #[arg(long)]
        workflow: Option<String>,
    },
    /// Check step backend, model and database health
    #[command(alias = "doctor")]
    Status,
    /// Show current configuration
    Config,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum WorkflowAction {
    /// Create a workflow
    Create {
        /// Workflow name
        name: String,
        /// Comma-separated steps: clean-text, summarize, extract-key-points, tag-category
        #[arg(long, value_delimiter = ',', required = true)]
        steps: Vec<String>,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// List workflows, newest first
    List,
    /// Show one workflow
    Show {
        /// Workflow id
        id: String,
    },
    /// Delete a workflow (its run history is kept)
    Delete {
        /// Workflow id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("textflow=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Handle completions before config loading
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(*shell, &mut cmd, "textflow", &mut std::io::stdout());
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Config => {
            let mut shown = config.clone();
            if shown.processor.api_key.is_some() {
                shown.processor.api_key = Some("***".to_string());
            }
            println!("{}", toml::to_string_pretty(&shown)?);
        }
        Commands::Status => {
            doctor::run_doctor(&config).await;
        }
        Commands::Workflow { action } => {
            let store = open_store(&config)?;
            handle_workflow(action, store.as_ref()).await?;
            close_store(store);
        }
        Commands::History { limit, workflow } => {
            let store = open_store(&config)?;
            let limit = limit.unwrap_or(config.gateway.default_history_limit).max(1);
            let runs = match workflow {
                Some(id) => store.list_for_workflow(&WorkflowId(id), limit).await?,
                None => store.list_recent(limit).await?,
            };
            if runs.is_empty() {
                println!("No runs yet.");
            }
            for run in &runs {
                print_run(run);
            }
            close_store(store);
        }
        Commands::Run { workflow_id, text } => {
            let text = if text.is_empty() {
                io::stdin()
                    .lock()
                    .lines()
                    .map_while(|l| l.ok())
                    .collect::<Vec<_>>()
                    .join("\n")
            } else {
                text.join(" ")
            };

            let store = open_store(&config)?;
            let workflow = store
                .get_workflow(&WorkflowId(workflow_id.clone()))
                .await?
                .ok_or(TextflowError::WorkflowNotFound(workflow_id))?;

            let event_bus = Arc::new(EventBus::default());
            let cancel = CancellationToken::new();
            let logger = config.log_dir().map(|dir| {
                let level = config.log.as_ref().map_or(1, |l| l.level);
                RunLogger::new(dir, level).spawn(&event_bus, cancel.clone())
            });

            let runner = WorkflowRunner::new(create_processor(&config)?, store.clone())
                .with_event_bus(event_bus.clone());
            let result = runner.execute(RunInput::from_workflow(&workflow, text)).await;

            // Closing the bus lets the logger drain what the run published.
            drop(runner);
            drop(event_bus);
            if let Some(handle) = logger {
                handle.await.ok();
            }
            close_store(store);

            match result {
                Ok(run) => {
                    for (i, step) in run.results.iter().enumerate() {
                        println!("── [{}] {} ──", i + 1, step.step);
                        println!("{}\n", step.output);
                    }
                    if !run.persisted.is_stored() {
                        eprintln!("Warning: this run could not be saved to history.");
                    }
                }
                Err(TextflowError::StepExecution {
                    step,
                    index,
                    message,
                }) => {
                    anyhow::bail!("step {} ({}) failed: {}", index + 1, step, message);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Serve => {
            let store = open_store(&config)?;
            let event_bus = Arc::new(EventBus::default());
            let cancel = CancellationToken::new();

            // The logger stops when the bus closes, not on Ctrl-C.
            let logger = config.log_dir().map(|dir| {
                let level = config.log.as_ref().map_or(1, |l| l.level);
                RunLogger::new(dir, level).spawn(&event_bus, CancellationToken::new())
            });

            let runner = Arc::new(
                WorkflowRunner::new(create_processor(&config)?, store.clone())
                    .with_event_bus(event_bus.clone()),
            );

            info!(bind = %config.gateway.bind, "Starting HTTP gateway");
            let server = textflow_gateway::GatewayServer::new(
                config.gateway.clone(),
                runner,
                store.clone(),
                store.clone(),
            );

            // Graceful shutdown on Ctrl-C
            let cancel_clone = cancel.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Shutting down gateway...");
                cancel_clone.cancel();
            });

            server.run(cancel).await?;

            drop(server);
            drop(event_bus);
            if let Some(handle) = logger {
                handle.await.ok();
            }
            close_store(store);
        }
        // Handled before config loading
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Config lookup: explicit path, then ~/.textflow/config.toml, then environment.
fn load_config(path: &PathBuf) -> anyhow::Result<AppConfig> {
    if path.exists() {
        return Ok(AppConfig::load(path)?);
    }

    if let Some(home_config) = dirs_home().map(|h| h.join(".textflow").join("config.toml")) {
        if home_config.exists() {
            info!(path = %home_config.display(), "Loading config from home directory");
            return Ok(AppConfig::load(&home_config)?);
        }
    }

    eprintln!("Warning: No config file found. Set GEMINI_API_KEY or create textflow.toml");
    eprintln!("See textflow.toml.example for reference.");
    Ok(AppConfig::from_env())
}

fn open_store(config: &AppConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let db_path = config.database_path();
    Ok(Arc::new(SqliteStore::open(&db_path)?))
}

/// Close the database if this is the last handle to it.
fn close_store(store: Arc<SqliteStore>) {
    match Arc::try_unwrap(store) {
        Ok(store) => {
            if let Err(e) = store.close() {
                warn!(error = %e, "Failed to close database");
            }
        }
        Err(_) => warn!("Database still in use at shutdown"),
    }
}

fn create_processor(config: &AppConfig) -> anyhow::Result<Arc<dyn StepProcessor>> {
    let processor = textflow_llm::create_processor(&config.processor)?;
    info!(processor = processor.name(), "Step processor ready");
    Ok(Arc::from(processor))
}

async fn handle_workflow(action: WorkflowAction, store: &SqliteStore) -> anyhow::Result<()> {
    match action {
        WorkflowAction::Create {
            name,
            steps,
            description,
        } => {
            let steps = steps
                .iter()
                .map(|s| s.trim().parse::<StepKind>().map(StepDefinition::from))
                .collect::<Result<Vec<_>, _>>()?;
            let workflow = Workflow::create(NewWorkflow {
                name,
                description,
                steps,
            })?;
            store.create_workflow(&workflow).await?;
            println!("Created workflow {}", workflow.id);
        }
        WorkflowAction::List => {
            let workflows = store.list_workflows().await?;
            if workflows.is_empty() {
                println!("No workflows yet.");
            }
            for wf in &workflows {
                println!("{}  {}  [{}]", wf.id, wf.name, step_list(&wf.step_kinds()));
            }
        }
        WorkflowAction::Show { id } => {
            let wf = store
                .get_workflow(&WorkflowId(id.clone()))
                .await?
                .ok_or(TextflowError::WorkflowNotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&wf)?);
        }
        WorkflowAction::Delete { id } => {
            if !store.delete_workflow(&WorkflowId(id.clone())).await? {
                return Err(TextflowError::WorkflowNotFound(id).into());
            }
            println!("Deleted workflow {}", id);
        }
    }
    Ok(())
}

fn step_list(kinds: &[StepKind]) -> String {
    kinds
        .iter()
        .map(StepKind::as_str)
        .collect::<Vec<_>>()
        .join(" → ")
}

fn print_run(run: &RunRecord) {
    let steps: Vec<StepKind> = run.steps.iter().map(|s| s.kind).collect();
    println!(
        "{}  {}  {}  {}  [{}]",
        run.created_at.format("%Y-%m-%d %H:%M:%S"),
        run.status,
        run.workflow_name,
        run.id,
        step_list(&steps)
    );
    if let Some(ref error) = run.error {
        println!("    error: {}", error);
    }
    println!("    input: {}", truncate(&run.input_text, 80));
    if let Some(last) = run.results.last() {
        println!("    {}: {}", last.step, truncate(&last.output, 80));
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

fn truncate(s: &str, max: usize) -> String {
    let line = s.lines().next().unwrap_or_default();
    if line.chars().count() <= max && line.len() == s.len() {
        line.to_string()
    } else {
        format!("{}…", line.chars().take(max).collect::<String>())
    }
}
