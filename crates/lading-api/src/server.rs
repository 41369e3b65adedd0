//! Axum server setup: routing, middleware, graceful shutdown.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use lading_core::platform::{OrderPlatform, ShippingPlatform};
use lading_sync::TrackingReconciler;

use crate::handlers;

/// Shared handler state.
pub struct AppState<U, D> {
    /// Reconciler driven by the shipment-confirmed webhook.
    pub reconciler: Arc<TrackingReconciler<U, D>>,
}

impl<U, D> Clone for AppState<U, D> {
    fn clone(&self) -> Self {
        Self { reconciler: self.reconciler.clone() }
    }
}

/// Creates the router with all routes and middleware.
pub fn create_router<U, D>(state: AppState<U, D>) -> Router
where
    U: OrderPlatform + 'static,
    D: ShippingPlatform + 'static,
{
    let health_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check));

    let webhook_routes = Router::new()
        .route("/webhooks/shipment-confirmed", post(handlers::shipment_confirmed::<U, D>));

    Router::new()
        .merge(health_routes)
        .merge(webhook_routes)
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Adds an `X-Request-Id` header to every response for cross-service
/// tracing.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;
    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }
    response
}

/// Serves the router until the token cancels, then drains in-flight
/// requests.
pub async fn start_server<U, D>(
    state: AppState<U, D>,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error>
where
    U: OrderPlatform + 'static,
    D: ShippingPlatform + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}
