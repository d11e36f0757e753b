use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use corpusdb_core::config;
use corpusdb_core::index::{IndexConfig, IndexKind};
use corpusdb_core::storage::{load_snapshot, save_snapshot, Database};
use corpusdb_server::api::create_router;
use corpusdb_server::api::handlers::AppState;

#[derive(Parser)]
#[command(name = "corpusdb", about = "In-memory vector database")]
struct Args {
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Snapshot file path (omit for in-memory only)
    #[arg(long)]
    snapshot_path: Option<PathBuf>,

    /// Snapshot interval in seconds (0 = snapshot only on shutdown)
    #[arg(long, default_value_t = config::DEFAULT_SNAPSHOT_INTERVAL_SECS)]
    snapshot_interval: u64,

    /// Index kind applied to newly created libraries
    #[arg(long, default_value = "linear")]
    default_index_kind: String,

    /// Default number of LSH bands
    #[arg(long, default_value_t = config::DEFAULT_LSH_BANDS)]
    lsh_bands: usize,

    /// Default number of LSH hashes per band
    #[arg(long, default_value_t = config::DEFAULT_LSH_HASHES)]
    lsh_hashes: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(
                    "corpusdb_server=info"
                        .parse()
                        .expect("valid directive literal"),
                )
                .add_directive(
                    "corpusdb_core=info"
                        .parse()
                        .expect("valid directive literal"),
                ),
        )
        .init();

    let args = Args::parse();

    if args.port == 0 {
        eprintln!("Error: port must be > 0");
        std::process::exit(1);
    }
    let default_kind: IndexKind = match args.default_index_kind.parse() {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    // Embedding credentials are opaque here: they are handed to whichever
    // provider the deployment wires up and never reach the engine.
    if std::env::var("CORPUSDB_EMBEDDING_API_KEY").is_ok() {
        tracing::info!("embedding provider credentials present");
    }

    // A snapshot that exists but fails to decode aborts startup; silently
    // serving an empty store would look like data loss.
    let db = match &args.snapshot_path {
        Some(path) if path.exists() => match load_snapshot(path) {
            Ok(db) => {
                tracing::info!(
                    libraries = db.library_count(),
                    chunks = db.chunk_count(),
                    "restored store from snapshot"
                );
                db
            }
            Err(e) => {
                eprintln!("Error: failed to load snapshot {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        _ => Database::new(),
    };

    let prometheus_handle =
        metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    let state = AppState {
        db: db.clone(),
        default_index_config: IndexConfig {
            kind: default_kind,
            lsh_bands: args.lsh_bands,
            lsh_hashes: args.lsh_hashes,
            ..IndexConfig::default()
        },
        snapshot_path: args.snapshot_path.clone(),
        prometheus_handle,
        start_time: Instant::now(),
    };

    let app = create_router(state);
    let addr = format!("{}:{}", args.host, args.port);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        default_index_kind = %default_kind,
        snapshots = args.snapshot_path.is_some(),
        "corpusdb ready"
    );

    if let Some(path) = args.snapshot_path.clone() {
        if args.snapshot_interval > 0 {
            let snap_db = db.clone();
            let interval_secs = args.snapshot_interval;
            tracing::info!("auto-snapshots enabled every {interval_secs}s");
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = save_snapshot(&snap_db, &path) {
                        tracing::error!("periodic snapshot failed: {e}");
                    }
                }
            });
        }
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_signal())
        .await?;

    if let Some(path) = &args.snapshot_path {
        tracing::info!("saving snapshot on shutdown");
        if let Err(e) = save_snapshot(&db, path) {
            tracing::error!("shutdown snapshot failed: {e}");
        }
    }

    Ok(())
}

async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }

    tracing::info!("Shutting down gracefully, draining in-flight requests...");
}
