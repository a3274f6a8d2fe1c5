//! Monad server binary: config, store migration, job runner, axum serve.
//!
//! Exits 0 on normal shutdown and 1 on any startup or migration failure.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;

use monad::client::ClientConnectionManager;
use monad::engine::ChatEngine;
use monad::jobs::{AgentRegistry, JobRunner};
use monad::session::SessionManager;
use monad::store::Store;
use monad::workspace::WorkspaceStore;
use serve::providers::{UnconfiguredLlm, ZeroEmbedder};
use serve::{build_app, AppState};

const DEFAULT_EMBEDDING_DIMENSION: usize = 768;

#[derive(Parser, Debug)]
#[command(name = "monad-server")]
#[command(about = "Monad — assistant platform server")]
struct Args {
    /// Bind address
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Bind port
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Database path (default: platform data dir)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Verbose logging (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Err(e) = env_config::load_and_apply("monad", None) {
        tracing::warn!(error = %e, "config load failed; continuing with process env");
    }

    let db_path = match args.db {
        Some(path) => path,
        None => env_config::db_path()?,
    };
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let sessions_root = env_config::sessions_root()?;
    std::fs::create_dir_all(&sessions_root)?;

    let store = Arc::new(Store::open(&db_path)?);
    tracing::info!(db = %db_path.display(), "store opened, migrations applied");

    let connections = Arc::new(ClientConnectionManager::new());
    let workspaces = Arc::new(WorkspaceStore::new(store.clone(), connections.clone()));
    let loaded = workspaces.load_all().await?;
    tracing::info!(loaded, "workspaces loaded");

    let embedder = Arc::new(ZeroEmbedder::new(DEFAULT_EMBEDDING_DIMENSION));
    let llm = Arc::new(UnconfiguredLlm);
    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        workspaces.clone(),
        connections.clone(),
        embedder.clone(),
        None,
        sessions_root,
    ));
    let engine = Arc::new(ChatEngine::new(
        sessions.clone(),
        llm.clone(),
        llm.clone(),
    ));

    let agents = Arc::new(AgentRegistry::new(store.clone(), engine.clone()));
    let runner = Arc::new(JobRunner::new(store.clone(), sessions.clone(), agents));
    let (_runner_handle, runner_stop) = runner.start();

    let state = Arc::new(AppState {
        store,
        sessions,
        engine,
        workspaces,
        connections,
        embedder,
        provider_status: "degraded",
        started_at: Instant::now(),
    });
    let app = build_app(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;

    runner_stop.cancel();
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args).await {
        tracing::error!(error = %e, "startup failed");
        std::process::exit(1);
    }
}
