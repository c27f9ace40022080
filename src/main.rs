use anyhow::Context;
use tokio::net::TcpListener;

use balance_keeper::config::Config;
use balance_keeper::db::Database;
use balance_keeper::http::{self, AppState};
use balance_keeper::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    let config = Config::from_env().context("failed to load configuration")?;
    telemetry::init(config.log.format);
    if dotenv.is_err() {
        tracing::warn!(".env file not found, using system environment variables");
    }
    config.validate().map_err(anyhow::Error::msg)?;

    tracing::info!(database = %config.database.name, "Connecting to document store");
    let db = Database::connect(&config.database).context("failed to connect to document store")?;

    let state = AppState::new(db.clone())?;
    let app = http::router(state, config.server.request_timeout());

    let addr = config.server.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    if let Err(err) = db.close() {
        tracing::error!(error = %err, "Error disconnecting from document store");
    }
    served.context("server error")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => tracing::error!(error = %err, "Failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
