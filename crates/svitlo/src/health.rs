//! Liveness endpoint for platform health probes.

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tracing::{error, info};

/// Serve a single fixed-body GET route. A 200 only says the process is up;
/// it says nothing about cycle health.
pub async fn serve(addr: SocketAddr) {
    let app = Router::new().route("/", get(|| async { "svitlo is running" }));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("liveness endpoint failed to bind {addr}: {e}");
            return;
        }
    };

    info!("liveness endpoint listening on http://{addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("liveness endpoint stopped: {e}");
    }
}
