//! flashq-server - flashcard quiz service
//!
//! `serve` (default) ingests the course corpus and runs the HTTP API;
//! `ingest` only ingests and exits.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flashq_common::config::load_config_file;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flashq_server::config::{Overrides, Settings};
use flashq_server::content::{ingest, load_corpus};
use flashq_server::db::{init_database, Repository};
use flashq_server::generation::{Generator, OpenAiGenerator};
use flashq_server::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "flashq-server")]
#[command(about = "Flashcard quiz service")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/flashq/config.toml when present)
    #[arg(short, long, env = "FLASHQ_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Ingest the course corpus and exit
    Ingest,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flashq_server=info,flashq_common=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Starting flashq-server v{}", env!("CARGO_PKG_VERSION"));

    let file = load_config_file(cli.config.as_deref()).context("Failed to load config file")?;
    let settings = Settings::resolve(cli.overrides, file).context("Invalid configuration")?;
    settings.log_summary();

    let pool = init_database(&settings.database)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database.display()))?;
    let repo = Repository::new(pool.clone());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Ingest => {
            let dir = settings
                .content_dir
                .as_deref()
                .context("content_dir must be configured for ingest")?;
            run_ingest(&repo, dir).await
        }
        Command::Serve => {
            if settings.ingest_on_startup {
                match settings.content_dir.as_deref() {
                    Some(dir) => run_ingest(&repo, dir).await?,
                    None => info!("No content directory configured, skipping ingestion"),
                }
            }
            serve(settings, pool).await
        }
    }
}

async fn run_ingest(repo: &Repository, dir: &std::path::Path) -> Result<()> {
    let definitions = load_corpus(dir)
        .with_context(|| format!("Failed to load course corpus from {}", dir.display()))?;
    let report = ingest(repo, &definitions)
        .await
        .context("Content ingestion failed")?;
    info!(
        "Content up to date: {} unchanged, {} created, {} replaced",
        report.unchanged, report.created, report.replaced
    );
    Ok(())
}

async fn serve(settings: Settings, pool: sqlx::SqlitePool) -> Result<()> {
    let generator: Option<Arc<dyn Generator>> = if settings.generation.enabled {
        let generator = OpenAiGenerator::new(
            settings.generation.base_url.clone(),
            settings.generation.api_key.clone(),
            settings.generation.model.clone(),
        )
        .context("Failed to build generation client")?;
        let generator: Arc<dyn Generator> = Arc::new(generator);
        Some(generator)
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let state = AppState::new(
        pool,
        generator,
        settings.event_queue_capacity,
        shutdown.clone(),
    );
    let app = build_router(state);

    let addr = settings.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("flashq-server listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let server = axum::serve(listener, app).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            // Ends event streams and generation so connections can drain
            shutdown.cancel();
        }
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => result.context("Server error")?,
        _ = async {
            shutdown.cancelled().await;
            tokio::time::sleep(settings.shutdown_grace).await;
        } => {
            warn!(
                "In-flight requests still running after {:?}, forcing shutdown",
                settings.shutdown_grace
            );
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
