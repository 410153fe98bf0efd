use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use attest_core::config::{
    BatcherConfig, DatabaseConfig, LedgerConfig, LedgerMode, QueueConfig, ServerConfig,
    WorkerConfig,
};
use attest_db::{PgStore, StatusStore};
use attest_engine::{PipelineConfig, Supervisor};
use attest_ingest::routes::build_router;
use attest_ledger::{HttpLedgerClient, LedgerClient, MockLedgerClient};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "attest_engine=debug,attest_ingest=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let server_cfg = ServerConfig::from_env();
    let queue_cfg = QueueConfig::from_env();
    let pipeline_cfg = PipelineConfig {
        worker: WorkerConfig::from_env(queue_cfg.consumer_count),
        batcher: BatcherConfig::from_env(),
        queue: queue_cfg,
    };
    let ledger_cfg = LedgerConfig::from_env();
    tracing::info!(
        host = %server_cfg.host,
        port = server_cfg.port,
        workers = pipeline_cfg.worker.concurrency,
        "Loaded configuration"
    );

    // --- Database ---
    let db_cfg = DatabaseConfig::from_env();
    let pool = attest_db::create_pool(&db_cfg)
        .await
        .expect("Failed to connect to database");
    attest_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database pool created and migrations applied");

    let store: Arc<dyn StatusStore> = Arc::new(PgStore::new(pool.clone()));
    store.ping().await.expect("Database health check failed");

    // --- Ledger client ---
    let ledger: Arc<dyn LedgerClient> = match ledger_cfg.mode {
        LedgerMode::Http => Arc::new(
            HttpLedgerClient::new(ledger_cfg, pipeline_cfg.worker.ledger_timeout)
                .expect("Failed to build ledger gateway client"),
        ),
        LedgerMode::Mock => {
            tracing::warn!("LEDGER_MODE=mock: notarizations stay in memory");
            Arc::new(MockLedgerClient::new())
        }
    };

    // --- Pipeline ---
    let cancel = CancellationToken::new();
    let (supervisor, app_state) = Supervisor::start(pipeline_cfg, store, ledger, cancel.clone());

    // --- HTTP server ---
    let app = build_router(app_state, &server_cfg);
    let addr = SocketAddr::new(
        server_cfg.host.parse().expect("Invalid HOST address"),
        server_cfg.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, draining pipeline");
    supervisor.shutdown().await;
    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the service shuts
/// down cleanly whether stopped interactively or by a process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
