//! HTTP server lifecycle: router assembly, background tasks, graceful
//! shutdown.

use std::sync::Arc;

use crate::api;
use crate::core::{AppState, BackgroundTasks, Config, TaskKind};
use crate::utils::AppError;

pub struct Server {
    config: Config,
    state: AppState,
}

impl Server {
    pub fn with_state(config: Config, state: AppState) -> Self {
        Self { config, state }
    }

    /// Bind, start background tasks, and serve until ctrl-c.
    pub async fn run(self) -> Result<(), AppError> {
        let mut tasks = BackgroundTasks::new();
        let shutdown = tasks.shutdown_token();

        // Auto-completion sweeper
        let sweeper = Arc::new(self.state.completion_sweeper());
        let sweep_interval = self.config.sweep_interval_secs;
        let sweep_shutdown = shutdown.clone();
        tasks.spawn("completion_sweeper", TaskKind::Periodic, async move {
            sweeper.run(sweep_interval, sweep_shutdown).await;
        });

        // Expired key cleanup for the token/rate-limit store
        let store = self.state.token_store.clone();
        let cleanup_interval = self.config.store_cleanup_interval_secs;
        let cleanup_shutdown = shutdown.clone();
        tasks.spawn("ttl_store_cleanup", TaskKind::Periodic, async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(cleanup_interval));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let removed = store.cleanup();
                        if removed > 0 {
                            tracing::debug!(removed, "expired store entries cleaned up");
                        }
                    }
                    _ = cleanup_shutdown.cancelled() => break,
                }
            }
        });

        let app = api::router(self.state.clone());
        let addr = format!("0.0.0.0:{}", self.config.http_port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("failed to bind {addr}: {e}")))?;

        tracing::info!("Storefront server listening on http://{addr}");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| AppError::Internal(format!("server error: {e}")))?;

        tasks.shutdown().await;
        Ok(())
    }
}
