//! flowgated — the Flowgate daemon.
//!
//! Single binary that assembles the control plane:
//! - Registry store (redb)
//! - Shard and vid registries
//! - Engine / incident / variable clients
//! - Saga orchestrator + command consumer
//! - Reconciliation sweeper
//! - REST API
//!
//! # Usage
//!
//! ```text
//! flowgated run --config flowgate.toml --port 9400 --data-dir /var/lib/flowgate
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use flowgate_core::FlowgateConfig;
use flowgate_engine::{EngineClientPool, IncidentClient, VariablesClient};
use flowgate_registry::{ShardRegistry, VidRegistry};
use flowgate_saga::{run_consumer, InMemoryQueue, Orchestrator};
use flowgate_sweep::Sweeper;

#[derive(Parser)]
#[command(name = "flowgated", about = "Flowgate daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane (API, command consumer, sweeper).
    Run {
        /// Path to flowgate.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides the config file).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the registry store (overrides the
        /// config file).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flowgated=debug,flowgate=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
        } => run(config, port, data_dir).await,
    }
}

async fn run(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Flowgate daemon starting");

    let config = match &config_path {
        Some(path) => FlowgateConfig::from_file(path)?,
        None => FlowgateConfig::default(),
    };
    let daemon = config.daemon.clone().unwrap_or_default();
    let port = port.or(daemon.port).unwrap_or(9400);
    let data_dir = data_dir
        .or_else(|| daemon.data_dir.clone().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("/var/lib/flowgate"));

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("flowgate.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // Registry store and the two registries over it.
    let store = flowgate_state::RegistryStore::open(&db_path)?;
    info!(path = ?db_path, "registry store opened");
    let shards = ShardRegistry::new(store.clone());
    let vids = VidRegistry::new(store);

    // Remote collaborator clients.
    let engines = EngineClientPool::new(config.engine_request_timeout())?;
    let incidents_url = match &config.incidents {
        Some(collaborator) => collaborator.base_url.clone(),
        None => {
            warn!("no [incidents] section in config, using http://127.0.0.1:9411");
            "http://127.0.0.1:9411".to_string()
        }
    };
    let variables_url = match &config.variables {
        Some(collaborator) => collaborator.base_url.clone(),
        None => {
            warn!("no [variables] section in config, using http://127.0.0.1:9412");
            "http://127.0.0.1:9412".to_string()
        }
    };
    let incidents = IncidentClient::new(engines.http(), &incidents_url);
    let variables = VariablesClient::new(engines.http(), &variables_url);

    // Saga orchestrator and its command queue.
    let orchestrator = Orchestrator::new(
        shards.clone(),
        vids.clone(),
        engines.clone(),
        incidents,
        variables,
    );
    let queue = InMemoryQueue::new();
    info!("saga orchestrator initialized");

    // Reconciliation sweeper.
    let sweeper = Arc::new(Sweeper::new(
        shards.clone(),
        vids,
        engines,
        config.sweep_age_buffer(),
    ));
    let sweep_interval = config.sweep_interval();
    info!(interval = ?sweep_interval, age_buffer = ?config.sweep_age_buffer(), "sweeper initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let consumer_shutdown = shutdown_rx.clone();
    let sweep_shutdown = shutdown_rx.clone();

    // ── Start background tasks ─────────────────────────────────

    // Command consumer loop.
    let consumer_queue = queue.clone();
    let consumer_orchestrator = orchestrator.clone();
    let consumer_handle = tokio::spawn(async move {
        run_consumer(consumer_orchestrator, consumer_queue, consumer_shutdown).await;
    });

    // Sweeper loop.
    let sweep_queue = queue.clone();
    let sweep_handle = tokio::spawn({
        let sweeper = sweeper.clone();
        async move {
            sweeper.run(sweep_interval, sweep_queue, sweep_shutdown).await;
        }
    });

    // ── Start API server ───────────────────────────────────────

    let router = flowgate_api::build_router(flowgate_api::ApiState {
        orchestrator,
        queue,
        shards,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = consumer_handle.await;
    let _ = sweep_handle.await;

    info!("Flowgate daemon stopped");
    Ok(())
}
