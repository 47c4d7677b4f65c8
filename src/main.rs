// ABOUTME: parley binary: loads configuration, starts the gateway worker and runs the control loop.
// ABOUTME: The console gateway client stands in for the chat platform transport.

use anyhow::Result;
use clap::{Parser, Subcommand};
use parley::config::Config;
use parley::gateway::console::ConsoleClient;
use parley::gateway::worker::{self, WorkerConfig};
use parley::orchestrator::SessionOrchestrator;
use parley::{logging, metrics, Pipeline, Runtime, WorkflowRegistry};
use parley_openai::HttpBackend;
use std::path::PathBuf;
use std::sync::Arc;

/// User id of the person at the console; also the bot owner.
const CONSOLE_USER: u64 = 1;

#[derive(Parser)]
#[command(name = "parley", version, about = "Relay between a chat gateway and a generative AI API")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relay (default)
    Run,
    /// Load and validate the configuration, then print it with secrets redacted
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command.unwrap_or(Command::Run) {
        Command::CheckConfig => {
            println!("{:#?}", config);
            Ok(())
        }
        Command::Run => run(config).await,
    }
}

async fn run(config: Config) -> Result<()> {
    let _logging = logging::init_logging(&config.system)?;
    metrics::init_metrics(config.system.metrics_port)?;

    tracing::info!(
        id_system = config.system.id_system.as_deref().unwrap_or("-"),
        id_node = config.system.id_node.as_deref().unwrap_or("-"),
        is_bit = config.openai.is_bit,
        is_async = config.openai.is_async,
        workflows = config.workflows.len(),
        "Starting parley"
    );

    let client = Box::new(ConsoleClient::new(CONSOLE_USER, "console"));
    let (bot, _gateway) = worker::spawn(
        WorkerConfig::from_config(&config),
        config.bot.queue_capacity,
        client,
    )?;

    let backend = Arc::new(HttpBackend::with_base_url(
        &config.openai.api_key,
        &config.openai.base_url,
    ));
    let pipeline = Pipeline::from_config(&config, WorkflowRegistry::default(), backend)?;
    let orchestrator =
        SessionOrchestrator::new(config.prompts.clone(), config.runtime.summary_model.clone());

    let runtime = Runtime::new(&config, bot, pipeline, orchestrator);
    runtime
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
