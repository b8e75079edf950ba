use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use parkchain_realtime::config::Settings;
use parkchain_realtime::server::{create_app, AppState};
use parkchain_realtime::shutdown::GracefulShutdown;
use parkchain_realtime::tasks::HeartbeatTask;
use parkchain_realtime::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    // Keep alive until exit so buffered spans are flushed
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!(
        heartbeat_interval_secs = settings.websocket.heartbeat_interval,
        api_key_required = settings.api.key.is_some(),
        "Configuration loaded"
    );

    let state = AppState::new(settings.clone());
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let heartbeat_task = HeartbeatTask::new(
        &settings.websocket,
        state.connection_manager.clone(),
        shutdown_tx.subscribe(),
    );
    let heartbeat_handle = tokio::spawn(heartbeat_task.run());

    let shutdown = GracefulShutdown::new(state.connection_manager.clone(), shutdown_tx);
    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown_signal().await;
            shutdown.execute(reason).await;
        })
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = heartbeat_handle.await;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM with the name of the signal
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
            "SIGINT"
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
            "SIGTERM"
        }
    }
}
