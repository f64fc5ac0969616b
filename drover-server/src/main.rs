use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use drover_data::sensing::SensingStore;
use drover_data::{db, migrations, SpecializationRegistry};
use drover_engine::{cleanup, jobs, EventBus, JobContext, JobScheduler, WorkerRegistry};
use drover_server::config::ServerConfig;
use drover_server::state::AppState;

#[derive(Parser)]
#[command(name = "drover-server", about = "Dispatches user tasks to HTTP back-end workers")]
struct Cli {
    /// Path to config file (default: ~/.config/drover/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured listen address
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load config
    let mut config = ServerConfig::load(cli.config.as_ref())?;
    if let Some(bind) = &cli.bind {
        config.bind = bind.parse().context("invalid --bind address")?;
    }
    info!(bind = %config.bind, db = %config.db_path.display(), "loaded config");

    // Open the task store
    let conn = db::open_or_create(&config.db_path)?;
    migrations::migrate(&conn)?;
    let conn = Arc::new(Mutex::new(conn));

    // Wire the engine
    let registry: Arc<dyn WorkerRegistry> = Arc::new(config.build_registry());
    let mut specializations = SpecializationRegistry::new();
    specializations.register(Arc::new(SensingStore));
    let specializations = Arc::new(specializations);

    let (scheduler, job_rx) = JobScheduler::new();
    let bus = EventBus::new(64);
    let cancel = CancellationToken::new();

    let http = reqwest::Client::builder()
        .timeout(config.dispatch_timeout)
        .build()?;
    let ctx = JobContext {
        conn: Arc::clone(&conn),
        registry: Arc::clone(&registry),
        specializations: Arc::clone(&specializations),
        http,
    };

    // Background loops, stopped through the shared cancellation token
    let runner = jobs::spawn_runner(job_rx, ctx, cancel.clone());
    let cleaner = cleanup::spawn_cleanup(
        Arc::clone(&conn),
        Arc::clone(&specializations),
        bus.subscribe(),
        cancel.clone(),
    );

    let tokens = config.token_map();
    if tokens.is_empty() {
        warn!("no auth tokens configured, every request will be rejected");
    }

    let state = AppState::new(conn, registry, specializations, scheduler, bus, tokens);
    let app = drover_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!("drover-server listening on http://{}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // Stop the background loops once the listener is gone
    cancel.cancel();
    runner.await?;
    cleaner.await?;

    info!("drover-server stopped");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
