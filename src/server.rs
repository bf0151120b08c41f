//! Ambient internal admin/health HTTP surface.
//!
//! Not a product feature (the spec's HTTP/REST Non-goal excludes an outward-facing API), but
//! every deployment needs a liveness probe and a place to inspect dispatcher health without a
//! shell into the process, so the prior binary's minimal Axum server is kept for that purpose,
//! generalized to report the [`HealthMonitor`]'s per-service status instead of a static string.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::{routing::get, Router};
use tokio::net::TcpListener;

use crate::dispatcher::HealthMonitor;

#[derive(Clone)]
struct AdminState {
    health: Arc<HealthMonitor>,
}

async fn root() -> &'static str {
    "agentry-core"
}

async fn health(State(state): State<AdminState>) -> Json<serde_json::Value> {
    let statuses = state.health.get_all_health_status();
    Json(serde_json::json!({ "services": statuses }))
}

/// Builds the admin router, reporting `health`'s registered services at `/health`.
#[must_use]
pub fn create_router(health: Arc<HealthMonitor>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(AdminState { health })
}

/// Binds a listener on `port` (0 lets the OS choose) and returns it with the actual address.
///
/// # Errors
///
/// Returns an error if the server cannot bind to the specified port.
pub async fn bind(port: u16) -> Result<(TcpListener, SocketAddr), std::io::Error> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    Ok((listener, actual_addr))
}

/// Serves `router` on `listener` until it fails or is aborted.
///
/// # Errors
///
/// Returns an error if the server fails during operation.
pub async fn serve(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    axum::serve(listener, router).await
}

/// As [`serve`], but shuts down gracefully on Ctrl+C.
///
/// # Errors
///
/// Returns an error if the server fails during operation.
pub async fn serve_with_graceful_shutdown(
    listener: TcpListener,
    router: Router,
) -> Result<(), std::io::Error> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
