use agentmesh_cli::commands;
use agentmesh_core::agents::EchoAgent;
use agentmesh_core::config::LlmProvider;
use agentmesh_core::{Orchestrator, Settings};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "agentmesh")]
#[command(about = "agentmesh - route questions to a mesh of agents")]
#[command(version)]
struct Cli {
    /// LLM model to use
    #[arg(short, long, global = true)]
    model: Option<String>,

    /// LLM provider (gemini, openai)
    #[arg(long, global = true)]
    provider: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List registered agents and their capabilities
    Agents,
    /// Route one query and print the outcome
    Ask {
        query: String,

        /// Send to this agent (repeat for several)
        #[arg(short, long = "agent")]
        agents: Vec<String>,

        /// Run the --agent list in order, feeding each result forward
        #[arg(long, requires = "agents")]
        pipeline: bool,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load();

    if let Some(ref provider) = cli.provider {
        let provider: LlmProvider = provider.parse()?;
        settings.llm.model = provider.default_model().to_string();
        settings.llm.provider = provider;
    }
    if let Some(ref model) = cli.model {
        settings.llm.model = model.clone();
    }

    let orchestrator = build_orchestrator(&settings)?;

    match cli.command {
        Command::Agents => {
            print!("{}", commands::render_agents(&orchestrator.list_agents()));
        }
        Command::Ask {
            query,
            agents,
            pipeline,
            json,
        } => {
            let request = commands::build_request(&query, &agents, pipeline);
            let response = orchestrator.route(&request).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print!("{}", commands::render_response(&response));
            }
        }
    }

    Ok(())
}

fn build_orchestrator(settings: &Settings) -> Result<Orchestrator> {
    let api_key = settings.api_key().unwrap_or_default();
    tracing::debug!(
        "Using {:?} model {} (key from {})",
        settings.llm.provider,
        settings.llm.model,
        settings.llm.api_key_env
    );

    let mut orchestrator = Orchestrator::with_credential(api_key, settings).with_context(|| {
        format!("set {} to use the LLM-backed agents", settings.llm.api_key_env)
    })?;
    orchestrator.register(Arc::new(EchoAgent))?;
    Ok(orchestrator)
}
