use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use sentiment_pipeline::api::{self, ApiState};
use sentiment_pipeline::config::AppConfig;
use sentiment_pipeline::ingest::{read_event_lines, read_events, spawn_line_reader, IngestSummary, Orchestrator};
use sentiment_pipeline::logging::{init_logging, OperationTimer};
use sentiment_pipeline::metrics::MetricsCollector;
use sentiment_pipeline::oracle::OpenAiOracle;
use sentiment_pipeline::validation::InputValidator;
use sentiment_pipeline::{AggregationEngine, Database, InboundEvent, SentimentRepository, SqliteRepository};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the read API
    Serve {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Also ingest newline-delimited JSON events from stdin
        #[arg(long)]
        ingest_stdin: bool,
    },
    /// Ingest newline-delimited JSON events
    Ingest {
        /// Input file, or - for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },
    /// List protocols seen so far
    Protocols,
    /// Show statistics for one protocol
    Stats {
        /// Protocol name
        protocol: String,

        /// Trailing window in days
        #[arg(short, long)]
        window_days: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    let log_file = config.logging.file_path.as_deref().map(Path::new);
    let _log_guard = init_logging(
        Some(&config.get_log_level()),
        log_file,
        config.logging.format == "json",
    )?;

    info!("Starting sentiment-pipeline");

    // Initialize database with configuration
    let database = Database::from_config(&config.database)?;

    let metrics = Arc::new(MetricsCollector::new());
    let repo: Arc<dyn SentimentRepository> = Arc::new(SqliteRepository::new(database, Arc::clone(&metrics)));

    match cli.command {
        Commands::Serve {
            host,
            port,
            ingest_stdin,
        } => serve(&config, repo, metrics, host, port, ingest_stdin).await?,
        Commands::Ingest { input } => ingest(&config, repo, metrics, &input).await?,
        Commands::Protocols => list_protocols(repo.as_ref()).await?,
        Commands::Stats {
            protocol,
            window_days,
        } => show_stats(repo, &protocol, window_days).await?,
    }

    Ok(())
}

fn build_orchestrator(
    config: &AppConfig,
    repo: Arc<dyn SentimentRepository>,
    metrics: Arc<MetricsCollector>,
) -> Result<Orchestrator> {
    let api_key = config
        .get_oracle_api_key()
        .context("No oracle API key: set oracle.api_key or OPENAI_API_KEY")?;
    let oracle = OpenAiOracle::new(&config.oracle, api_key)?;
    Ok(Orchestrator::from_config(config, repo, Arc::new(oracle), metrics))
}

/// Run the pipeline over an event reader until it is exhausted or a shutdown
/// signal arrives. Pipelines already started are drained either way.
async fn ingest_from<F, Fut>(config: &AppConfig, orchestrator: Orchestrator, read: F) -> Result<IngestSummary>
where
    F: FnOnce(mpsc::Sender<InboundEvent>) -> Fut,
    Fut: Future<Output = std::io::Result<usize>> + Send + 'static,
{
    let concurrency = config.ingestion.max_concurrent_pipelines;
    let (tx, rx) = mpsc::channel(concurrency * 2);

    let reader_task = tokio::spawn(read(tx));
    let stop_reading = reader_task.abort_handle();
    let watcher = tokio::spawn(async move {
        shutdown_signal().await;
        stop_reading.abort();
    });

    let summary = orchestrator.run(rx, concurrency).await;
    watcher.abort();

    match reader_task.await {
        Ok(rejected) => {
            let rejected = rejected?;
            if rejected > 0 {
                warn!(rejected, "Some input lines were not valid events");
            }
        }
        Err(e) if e.is_cancelled() => info!("Stopped reading input on shutdown"),
        Err(e) => return Err(e.into()),
    }
    Ok(summary)
}

/// Ingest events from a file or stdin
#[allow(clippy::print_stdout)]
async fn ingest(
    config: &AppConfig,
    repo: Arc<dyn SentimentRepository>,
    metrics: Arc<MetricsCollector>,
    input: &str,
) -> Result<()> {
    let orchestrator = build_orchestrator(config, repo, Arc::clone(&metrics))?;
    let timer = OperationTimer::new("ingest");

    let summary = if input == "-" {
        ingest_from(config, orchestrator, read_stdin).await?
    } else {
        let path = PathBuf::from(input);
        let file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        ingest_from(config, orchestrator, |tx| read_events(BufReader::new(file), tx)).await?
    };

    let elapsed = timer.finish();
    let snapshot = metrics.snapshot();
    println!(
        "received {} | stored {} | duplicates {} | skipped {} | failed {} ({} extraction, {} storage) in {:.1}s",
        summary.received,
        summary.stored,
        summary.duplicates,
        summary.skipped,
        summary.failed,
        snapshot.extraction_failures,
        snapshot.storage_failures,
        elapsed.as_secs_f64()
    );
    Ok(())
}

/// Serve the read API, optionally ingesting from stdin alongside
async fn serve(
    config: &AppConfig,
    repo: Arc<dyn SentimentRepository>,
    metrics: Arc<MetricsCollector>,
    host: Option<String>,
    port: Option<u16>,
    ingest_stdin: bool,
) -> Result<()> {
    let ingestion = if ingest_stdin {
        let orchestrator = build_orchestrator(config, Arc::clone(&repo), metrics)?;
        let config = config.clone();
        Some(tokio::spawn(async move {
            ingest_from(&config, orchestrator, read_stdin).await
        }))
    } else {
        None
    };

    let app = api::router(ApiState::new(repo, &config.server))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let addr: SocketAddr = format!("{host}:{}", port.unwrap_or(config.server.port))
        .parse()
        .with_context(|| format!("Invalid bind address {host}"))?;

    info!("Read API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = ingestion {
        let summary = handle.await??;
        info!(stored = summary.stored, failed = summary.failed, "Stdin ingestion finished");
    }

    info!("Shut down");
    Ok(())
}

/// Stdin is read on its own thread so a pending read never delays exit
fn read_stdin(events: mpsc::Sender<InboundEvent>) -> impl Future<Output = std::io::Result<usize>> {
    let lines = spawn_line_reader(std::io::BufReader::new(std::io::stdin()), events.max_capacity());
    read_event_lines(lines, events)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[allow(clippy::print_stdout)]
async fn list_protocols(repo: &dyn SentimentRepository) -> Result<()> {
    let names = repo.get_protocol_names().await?;
    if names.is_empty() {
        println!("No protocols recorded yet");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

#[allow(clippy::print_stdout)]
async fn show_stats(repo: Arc<dyn SentimentRepository>, protocol: &str, window_days: Option<u32>) -> Result<()> {
    InputValidator::validate_protocol_name(protocol)?;
    let window_days = window_days.map(InputValidator::validate_window_days).transpose()?;

    let engine = AggregationEngine::new(repo);
    match engine.aggregate(protocol, window_days).await? {
        Some(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
        None => println!("No messages found for protocol {protocol}"),
    }
    Ok(())
}
