//! Server lifecycle shared by all three services: middleware stack, health
//! endpoints, graceful shutdown, and the bind-and-serve loop.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod health;
pub mod shutdown;

pub use health::health_router;
pub use shutdown::{HealthState, ShutdownController};

/// Applies the standard HTTP middleware, outermost to innermost: request
/// tracing, permissive CORS, request timeout.
#[must_use]
pub fn with_default_middleware(router: Router, request_timeout: Duration) -> Router {
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::Method;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION]);

    router.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(TimeoutLayer::new(request_timeout)),
    )
}

/// Binds `host:port` and serves `router` until a shutdown signal.
///
/// Marks the controller Ready once bound, Draining when the signal fires
/// (SIGINT, SIGTERM, or an external [`ShutdownController::trigger_shutdown`]),
/// and Stopped after the server drains.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server hits a
/// fatal I/O error.
pub async fn serve(
    host: &str,
    port: u16,
    router: Router,
    shutdown: Arc<ShutdownController>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(format!("{host}:{port}")).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "listening");

    shutdown.set_ready();
    let mut triggered = shutdown.shutdown_receiver();
    let controller = Arc::clone(&shutdown);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                () = os_signals() => controller.trigger_shutdown(),
                _ = triggered.changed() => {}
            }
        })
        .await?;

    shutdown.set_stopped();
    info!("server stopped");
    Ok(())
}

/// Completes on SIGINT or, on unix, SIGTERM.
async fn os_signals() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        _ = terminate => {}
    }
}
