//! HTTP handlers: health probes and the shipment-confirmed webhook.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use lading_sync::ReconcileOutcome;

use crate::server::AppState;
use lading_core::platform::{OrderPlatform, ShippingPlatform};

/// Health response for orchestration probes.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `healthy` when the process can answer at all.
    pub status: &'static str,
    /// When the check ran.
    pub timestamp: DateTime<Utc>,
    /// Service version.
    pub version: &'static str,
}

/// Liveness: the process is up.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: the service is wired and accepting work. The pipeline
/// tolerates platform outages on its own, so readiness does not probe
/// the platforms.
pub async fn readiness_check() -> StatusCode {
    StatusCode::OK
}

/// Webhook payload for a shipment reaching the shipped state.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentConfirmed {
    /// Shipment that shipped.
    pub shipment_id: String,
}

/// Webhook response body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResponse {
    /// One of `updated`, `skipped`, `unresolvable`, or `error`.
    pub outcome: &'static str,
    /// Order the tracking landed on, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    /// Why resolution failed, for `unresolvable`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Handles the shipment-confirmed webhook.
///
/// Unresolvable shipments answer 200: retrying the webhook cannot fix
/// them and the platform would otherwise redeliver forever. Transient
/// failures answer 502 so the platform retries.
pub async fn shipment_confirmed<U, D>(
    State(state): State<AppState<U, D>>,
    Json(payload): Json<ShipmentConfirmed>,
) -> impl IntoResponse
where
    U: OrderPlatform + 'static,
    D: ShippingPlatform + 'static,
{
    info!(shipment_id = %payload.shipment_id, "shipment-confirmed webhook received");
    match state.reconciler.handle_shipment_confirmed(&payload.shipment_id).await {
        Ok(ReconcileOutcome::Updated { order_id, .. }) => (
            StatusCode::OK,
            Json(ReconcileResponse { outcome: "updated", order_id: Some(order_id), reason: None }),
        ),
        Ok(ReconcileOutcome::Skipped { order_id }) => (
            StatusCode::OK,
            Json(ReconcileResponse { outcome: "skipped", order_id: Some(order_id), reason: None }),
        ),
        Ok(ReconcileOutcome::Unresolvable { reason }) => {
            error!(shipment_id = %payload.shipment_id, %reason, "reconciliation unresolvable");
            (
                StatusCode::OK,
                Json(ReconcileResponse {
                    outcome: "unresolvable",
                    order_id: None,
                    reason: Some(reason),
                }),
            )
        }
        Err(e) => {
            error!(shipment_id = %payload.shipment_id, error = %e, "reconciliation failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(ReconcileResponse {
                    outcome: "error",
                    order_id: None,
                    reason: Some(e.to_string()),
                }),
            )
        }
    }
}
