//! Gateway server lifecycle: starts/stops the axum HTTP server that
//! serves the gateway router.
//!
//! bind → spawn background task → return handle with shutdown channel.
//! The router is served with `ConnectInfo<SocketAddr>` so the throttle
//! middleware can key clients by peer address.

use std::net::SocketAddr;

use axum::Router;
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════
// Public types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind gateway server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Failed to get server address: {0}")]
    LocalAddr(std::io::Error),
}

/// Session metadata for a running gateway server.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySession {
    pub session_id: String,
    pub server_addr: String,
    pub port: u16,
    pub started_at: String,
}

/// Handle to a running gateway server.
pub struct GatewayServer {
    pub session: GatewaySession,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl GatewayServer {
    /// Ask the server to stop accepting connections. In-flight requests
    /// are allowed to finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Gateway server shutdown signal sent");
        }
    }

    /// Shut down and wait for the serving task to exit.
    pub async fn stop(mut self) {
        self.shutdown();
        if let Err(e) = self.task.await {
            tracing::error!("Gateway server task failed: {e}");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Server lifecycle
// ═══════════════════════════════════════════════════════════

/// Bind `addr` and serve `app` in a background tokio task.
///
/// Port 0 binds an ephemeral port; the chosen port is reported in the
/// returned session.
pub async fn start_gateway_server(app: Router, addr: SocketAddr) -> Result<GatewayServer, ServerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;

    let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;

    let session = GatewaySession {
        session_id: Uuid::new_v4().to_string(),
        server_addr: addr.to_string(),
        port: addr.port(),
        started_at: chrono::Utc::now().to_rfc3339(),
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("Gateway server received shutdown signal");
        };

        tracing::info!(%addr, "Gateway server started");

        if let Err(e) = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal)
        .await
        {
            tracing::error!("Gateway server error: {e}");
        }

        tracing::info!("Gateway server stopped");
    });

    Ok(GatewayServer {
        session,
        shutdown_tx: Some(shutdown_tx),
        task,
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
