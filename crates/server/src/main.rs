use anyhow::Context;
use tokio::net::TcpListener;

mod config;
mod error;
mod routes;
mod telemetry;

use config::ServerConfig;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;
    telemetry::init(config.log_format);

    // The recognizer is loaded once and shared by every request.
    let recognizer = config
        .recognizer
        .build()
        .context("Failed to initialize text recognizer")?;
    let app = routes::router(AppState::new(recognizer), config.max_upload_bytes);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        backend = ?config.recognizer.backend,
        "tillroll listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
