//! HTTP front end for the tool-calling chat orchestrator.
//!
//! Usage:
//!   OPENROUTER_API_KEY=sk-or-... cargo run
//!   cargo run -- --bind 0.0.0.0:8080 --model openai/gpt-4o-mini
//!
//! Settings are read from the environment (and `.env`); flags override them.

use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use toolchat::{server, ChatConfig, Orchestrator};

#[derive(Parser)]
#[command(
    name = "toolchat",
    about = "Chat service that lets a hosted model call local tools"
)]
struct Cli {
    /// Listen address (overrides TOOLCHAT_BIND)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Model identifier (overrides TOOLCHAT_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Max model calls per chat request (overrides TOOLCHAT_MAX_ITERATIONS)
    #[arg(long)]
    max_iterations: Option<NonZeroUsize>,

    /// Send the conversation without the formatting system prompt
    #[arg(long)]
    no_system_prompt: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toolchat=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ChatConfig::from_env()?;
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(model) = cli.model {
        config.model = model;
    }
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations.get();
    }
    if cli.no_system_prompt {
        config.system_prompt = None;
    }

    let orchestrator = Orchestrator::new(
        config.provider(),
        config.tools(),
        config.orchestrator_config(),
    );
    let listener = TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        model = %config.model,
        tools = ?orchestrator.tools().tool_names(),
        "listening"
    );

    server::serve(listener, Arc::new(orchestrator), async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;
    Ok(())
}
