use anyhow::Context;
use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fileforge::app::create_app;
use fileforge::config::settings::AppConfig;
use fileforge::engine::Engine;
use fileforge::infrastructure::storage::StorageService;
use fileforge::state::AppState;
use fileforge::transcoders::builtin_registry;
use fileforge::workers::sweeper::RetentionSweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new().context("Invalid configuration")?;
    let schedule = config.cleanup_schedule()?;

    let storage = StorageService::from_config(&config)
        .await
        .context("Failed to initialize storage")?;
    info!(backend = storage.backend_name(), "📦 Storage ready");

    let engine = Engine::start(config.engine_config(), builtin_registry(), storage.clone());

    let sweeper_shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(engine.coordinator(), storage.clone(), config.retention());
    let sweeper_handle = tokio::spawn(sweeper.run(schedule, sweeper_shutdown.clone()));

    let addr = format!("0.0.0.0:{}", config.server_port);
    let state = AppState::new(config, engine.coordinator(), storage);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper_shutdown.cancel();
    let _ = sweeper_handle.await;
    engine.shutdown().await;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
