use std::sync::Arc;

use anyhow::Result;
use newsletter::AppState;
use newsletter_tracking::SystemClock;
use tower_http::trace::TraceLayer;

pub async fn serve(
    config: newsletter::Config,
    host_override: Option<String>,
    port_override: Option<u16>,
) -> Result<()> {
    tracing::info!("Starting newsletter tracking server...");

    // Use CLI overrides if provided, otherwise use config
    let host = host_override.unwrap_or(config.server.host.to_owned());
    let port = port_override.unwrap_or(config.server.port);

    // Write pool first: it creates the file and switches it to WAL
    let write_pool = newsletter::create_write_pool(&config.database.url).await?;
    let read_pool =
        newsletter::create_read_pool(&config.database.url, config.database.max_connections)
            .await?;

    let tracking = Arc::new(newsletter::build_tracking(
        &config,
        read_pool.clone(),
        write_pool.clone(),
        Arc::new(SystemClock),
    ));

    let mut scheduler = if config.scheduler.enabled {
        let scheduler = newsletter::scheduler::scheduler(&config.scheduler, tracking.clone()).await?;
        scheduler.start().await?;
        tracing::info!(
            prune = %config.scheduler.prune_cron,
            snapshot = %config.scheduler.snapshot_cron,
            "Maintenance scheduler started"
        );
        Some(scheduler)
    } else {
        None
    };

    let state = AppState {
        config,
        tracking,
        pool: read_pool.clone(),
    };

    let app = newsletter::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    let shutdown_signal = async {
        let ctrl_c = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(err = %err, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(err) => {
                    tracing::error!(err = %err, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C signal");
            },
            _ = terminate => {
                tracing::info!("Received SIGTERM signal");
            },
        }

        tracing::info!("Starting graceful shutdown...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Some(scheduler) = scheduler.as_mut() {
        tracing::info!("Stopping maintenance scheduler...");
        if let Err(err) = scheduler.shutdown().await {
            tracing::error!(err = %err, "failed to stop maintenance scheduler");
        }
    }

    tracing::info!("Closing database pools...");
    read_pool.close().await;
    write_pool.close().await;

    tracing::info!("Graceful shutdown complete");

    Ok(())
}
