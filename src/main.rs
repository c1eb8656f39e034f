//! Approval agent
//!
//! A tool-using conversational agent whose side effects wait for a human
//! decision. Conversations are checkpointed so a pending approval survives
//! restarts. Two drivers share one runtime: an HTTP server and an
//! interactive terminal chat.

mod api;
mod cli;
mod config;
mod db;
mod oracle;
mod runtime;
mod state_machine;
mod tools;

use api::{create_router, AppState};
use clap::{Parser, Subcommand};
use config::{Config, QuoteSourceKind};
use db::{Database, MemoryStore};
use oracle::{LoggingOracle, OpenAIOracle, Oracle};
use runtime::{AgentRuntime, CheckpointStore, ProductionRuntime};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tools::{AlphaVantageQuotes, QuoteSource, ToolRegistry};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Approval-gated trading assistant
#[derive(Parser, Debug)]
#[command(name = "approval-agent", version, about, long_about = None)]
struct Cli {
    /// Checkpoint database path, or `:memory:`
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Oracle model name
    #[arg(long, global = true)]
    model: Option<String>,

    /// Price source for the quote tool
    #[arg(long, global = true, value_parser = parse_quote_source)]
    quotes: Option<QuoteSourceKind>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat in the terminal
    Chat {
        /// Session to continue; a new one is created when omitted
        #[arg(long)]
        session: Option<String>,
    },
}

fn parse_quote_source(s: &str) -> Result<QuoteSourceKind, String> {
    s.parse()
        .map_err(|other| format!("unknown quote source '{other}' (expected static or alphavantage)"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(matches!(cli.command, Commands::Serve { .. }));

    let mut config = Config::from_env()?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }
    if let Some(model) = cli.model {
        config.oracle_model = model;
    }
    if let Some(quotes) = cli.quotes {
        config.quote_source = quotes;
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            serve(&config).await
        }
        Commands::Chat { session } => {
            let session_id = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            chat(&config, &session_id).await
        }
    }
}

/// JSON lines for the server, compact human output for the terminal
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "approval_agent=info,tower_http=info".into());

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn build_runtime(config: &Config) -> Result<ProductionRuntime, Box<dyn std::error::Error>> {
    let store: Arc<dyn CheckpointStore> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory checkpoint store; sessions will not survive restart");
        Arc::new(MemoryStore::new())
    } else {
        // Ensure database directory exists
        if let Some(parent) = PathBuf::from(&config.db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!(path = %config.db_path, "Opening checkpoint database");
        Arc::new(Database::open(&config.db_path)?)
    };

    let client = OpenAIOracle::new(
        config.require_openai_key()?,
        config.oracle_model.clone(),
        config.oracle_base_url.as_deref(),
    )?;
    let oracle: Arc<dyn Oracle> = Arc::new(LoggingOracle::new(Arc::new(client)));

    let tools = match config.quote_source {
        QuoteSourceKind::Static => ToolRegistry::standard(),
        QuoteSourceKind::AlphaVantage => {
            let quotes: Arc<dyn QuoteSource> = Arc::new(AlphaVantageQuotes::new(
                config.require_alphavantage_key()?,
                config.quote_timeout,
            )?);
            ToolRegistry::trading(quotes)
        }
    };
    tracing::info!(
        model = %config.oracle_model,
        quotes = ?config.quote_source,
        max_tool_rounds = config.max_tool_rounds,
        "Runtime configured"
    );

    Ok(AgentRuntime::new(
        store,
        oracle,
        tools,
        config.runtime_config(),
    ))
}

async fn serve(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(build_runtime(config)?);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Approval agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

async fn chat(config: &Config, session_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = build_runtime(config)?;
    tracing::info!(session_id = %session_id, "Starting chat session");
    println!("Session {session_id}. Type 'quit' or 'exit' to leave.");

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    cli::run_chat(&runtime, session_id, stdin, tokio::io::stdout()).await?;
    Ok(())
}
