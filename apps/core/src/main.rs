// AdmiChat Backend Entry Point
// Admissions chatbot: socket gateway + document ingestion pipeline

mod actors;
mod config;
mod database;
mod embedding;
mod error;
mod fs_manager;
mod gateway;
mod ingest;
mod media;
mod models;
mod preflight;
mod prompt;
mod rate_limiter;
mod text_extract;
mod vector_store;


use actors::supervisor::SupervisorHandle;
use clap::{Parser, Subcommand};
use config::Config;
use gateway::socket::SocketRegistry;
use gateway::GatewayState;
use media::speech::SpeechClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// AdmiChat: university admissions chatbot backend.
///
/// `serve` runs the realtime gateway the chat widget connects to;
/// `ingest` runs the one-shot pipeline that fills the document store the
/// answers are grounded on.
#[derive(Parser)]
#[command(name = "admichat", about = "AdmiChat, a university admissions chatbot backend", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the socket gateway and REST API (the default).
    Serve,
    /// Run the document ingestion pipeline.
    Ingest {
        #[command(subcommand)]
        source: IngestSource,
    },
}

#[derive(Subcommand)]
enum IngestSource {
    /// Markdown folders with embedded images (data/documents/md).
    Markdown {
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 500)]
        chunk_overlap: usize,
    },
    /// Loose PDF/TXT documents (data/documents/upload by default).
    Documents {
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Space-separated extension filter.
        #[arg(long, default_value = ".pdf .txt")]
        types: String,
        #[arg(long, default_value_t = 1000)]
        chunk_size: usize,
        #[arg(long, default_value_t = 500)]
        chunk_overlap: usize,
    },
    /// Remote web pages.
    Websites {
        /// Pages to fetch and ingest.
        #[arg(required = true)]
        urls: Vec<String>,
        /// CSS selector for the content to keep.
        #[arg(long, default_value = "body")]
        selector: String,
        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
        #[arg(long, default_value_t = 100)]
        chunk_overlap: usize,
    },
}

fn init_tracing() {
    use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::{EnvFilter, Registry};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let formatting_layer = BunyanFormattingLayer::new("admichat".into(), std::io::stdout);
    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await?,
        Commands::Ingest { source } => {
            fs_manager::PortablePathManager::init()?;
            let report = match source {
                IngestSource::Markdown { chunk_size, chunk_overlap } => {
                    ingest::run_markdown(&config, chunk_size, chunk_overlap).await?
                }
                IngestSource::Documents { dir, types, chunk_size, chunk_overlap } => {
                    ingest::run_documents(&config, dir, &types, chunk_size, chunk_overlap).await?
                }
                IngestSource::Websites { urls, selector, chunk_size, chunk_overlap } => {
                    ingest::run_websites(&config, &urls, &selector, chunk_size, chunk_overlap)
                        .await?
                }
            };
            println!(
                "Ingested {} documents ({} chunks)",
                report.documents, report.chunks
            );
        }
    }

    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let report = preflight::run_preflight_checks(&config).await;
    if !report.ready_to_start {
        anyhow::bail!("Preflight failed: {}", report.summary);
    }

    let pool = database::init_db(None).await?;
    let config = Arc::new(config);

    let registry = SocketRegistry::new();
    let supervisor = SupervisorHandle::new(config.clone(), pool, registry.clone());
    let speech = SpeechClient::new(&config);

    let state = GatewayState {
        config: config.clone(),
        registry,
        supervisor,
        speech,
    };
    let app = gateway::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("AdmiChat gateway listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
