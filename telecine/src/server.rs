//! Server lifecycle: HTTP serving and coordinated graceful shutdown.
//!
//! On SIGINT/SIGTERM the HTTP server stops accepting work, the
//! ingestion queue is drained, upstream clients are stopped, and the
//! store connection pool is closed.

use std::sync::Arc;

use anyhow::Result;
use sqlx::PgPool;
use tracing::info;

use telecine_api::AppState;
use telecine_core::service::{ChatNotifier, IngestService};
use telecine_core::upstream::WorkerPool;
use telecine_core::Config;

pub struct TelecineServer {
    config: Arc<Config>,
    state: AppState,
    ingest: IngestService,
    pool: Arc<WorkerPool>,
    pg: PgPool,
    notifier: Arc<ChatNotifier>,
}

impl TelecineServer {
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        state: AppState,
        ingest: IngestService,
        pool: Arc<WorkerPool>,
        pg: PgPool,
        notifier: Arc<ChatNotifier>,
    ) -> Self {
        Self {
            config,
            state,
            ingest,
            pool,
            pg,
            notifier,
        }
    }

    pub async fn start(self) -> Result<()> {
        let addr = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("HTTP server listening on {addr}");

        let router = telecine_api::create_router(self.state.clone());
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Signal received, initiating shutdown...");
        self.notifier
            .info("⚠️ Signal received, initiating shutdown...")
            .await;

        info!("Draining ingestion queue...");
        self.ingest.shutdown().await;

        self.pool.shutdown().await;
        self.pg.close().await;

        info!("Shutdown complete");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
