//! Tracking reconciliation from shipped shipments back to source orders.
//!
//! Driven by the shipment-confirmed webhook. The upstream order id is
//! recovered from the strongest available link: the order tag written at
//! creation, then the linked sales order's reference field, then a
//! numeric display number. Pushes are idempotent; a tracking number the
//! order already carries is a skip, not an error.

use std::sync::Arc;

use tracing::{debug, info, warn};

use lading_core::{
    error::{Result, SyncError},
    models::{order_id_from_tags, DownstreamShipment, TrackingUpdate},
    platform::{OrderPlatform, ShippingPlatform},
};

/// Outcome of handling one shipment-confirmed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Tracking was pushed to the upstream order.
    Updated {
        /// Order the update landed on.
        order_id: String,
        /// Tracking number pushed.
        tracking_number: String,
    },
    /// The order already carried this tracking number.
    Skipped {
        /// Order that already had the number.
        order_id: String,
    },
    /// No upstream order id could be recovered, or the shipment carries
    /// no tracking data. Reported for manual handling, never retried.
    Unresolvable {
        /// Why resolution failed.
        reason: String,
    },
}

/// Pushes tracking data from shipped shipments onto their source orders.
pub struct TrackingReconciler<U, D> {
    upstream: Arc<U>,
    downstream: Arc<D>,
}

impl<U: OrderPlatform, D: ShippingPlatform> TrackingReconciler<U, D> {
    /// Creates a reconciler over the two platforms.
    pub fn new(upstream: Arc<U>, downstream: Arc<D>) -> Self {
        Self { upstream, downstream }
    }

    /// Handles one shipment-confirmed notification.
    pub async fn handle_shipment_confirmed(&self, shipment_id: &str) -> Result<ReconcileOutcome> {
        let shipment = self.downstream.get_shipment(shipment_id).await?;

        let Some(order_id) = self.resolve_order_id(&shipment).await? else {
            warn!(shipment_id, "no upstream order id recoverable from shipment");
            return Ok(ReconcileOutcome::Unresolvable {
                reason: format!("shipment {shipment_id} has no recoverable order reference"),
            });
        };

        let Some(update) = self.tracking_for(&shipment).await? else {
            warn!(shipment_id, order_id, "shipment confirmed without tracking data");
            return Ok(ReconcileOutcome::Unresolvable {
                reason: format!("shipment {shipment_id} carries no tracking number"),
            });
        };

        let order = match self.upstream.fetch_order(&order_id).await {
            Ok(order) => order,
            Err(SyncError::OrderNotFound { .. }) => {
                return Ok(ReconcileOutcome::Unresolvable {
                    reason: format!("order {order_id} no longer exists upstream"),
                });
            }
            Err(e) => return Err(e),
        };
        if order.tracking_numbers.iter().any(|t| t == &update.tracking_number) {
            debug!(order_id, tracking = %update.tracking_number, "tracking already pushed");
            return Ok(ReconcileOutcome::Skipped { order_id });
        }

        self.upstream.push_tracking(&order_id, &update).await?;
        info!(order_id, tracking = %update.tracking_number, "tracking reconciled upstream");
        Ok(ReconcileOutcome::Updated { order_id, tracking_number: update.tracking_number })
    }

    /// Order-id resolution chain: tag, linked order reference, numeric
    /// display number.
    async fn resolve_order_id(&self, shipment: &DownstreamShipment) -> Result<Option<String>> {
        if let Some(order_id) = order_id_from_tags(&shipment.tags) {
            return Ok(Some(order_id.to_string()));
        }
        if let Some(reference) =
            self.downstream.linked_order_reference(&shipment.shipment_id).await?
        {
            return Ok(Some(reference));
        }
        let numeric = shipment
            .display_number
            .as_deref()
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()));
        Ok(numeric.map(str::to_string))
    }

    /// Tracking data from the shipment record, falling back to the first
    /// purchased label.
    async fn tracking_for(&self, shipment: &DownstreamShipment) -> Result<Option<TrackingUpdate>> {
        if let Some(tracking_number) = shipment.tracking_number.clone() {
            return Ok(Some(TrackingUpdate {
                tracking_number,
                carrier_code: shipment.carrier_code.clone(),
                ship_date: shipment.ship_date,
            }));
        }
        let labels = self.downstream.shipment_labels(&shipment.shipment_id).await?;
        Ok(labels.into_iter().next().map(|label| TrackingUpdate {
            tracking_number: label.tracking_number,
            carrier_code: label.carrier_code.or_else(|| shipment.carrier_code.clone()),
            ship_date: label.created_at.or(shipment.ship_date),
        }))
    }
}

#[cfg(test)]
mod tests {
    use lading_core::models::{order_tag, ShipmentLabel};
    use lading_testing::{FakeOrderPlatform, FakeShippingPlatform, OrderBuilder};

    use super::*;

    fn reconciler(
        upstream: FakeOrderPlatform,
        downstream: FakeShippingPlatform,
    ) -> TrackingReconciler<FakeOrderPlatform, FakeShippingPlatform> {
        TrackingReconciler::new(Arc::new(upstream), Arc::new(downstream))
    }

    fn shipped(shipment_id: &str, tags: Vec<String>) -> DownstreamShipment {
        DownstreamShipment {
            shipment_id: shipment_id.to_string(),
            status: Some("shipped".to_string()),
            carrier_code: Some("ups".to_string()),
            tracking_number: Some("1Z999".to_string()),
            tags,
            ..DownstreamShipment::default()
        }
    }

    #[tokio::test]
    async fn pushes_tracking_resolved_from_tag() {
        let upstream = FakeOrderPlatform::new();
        upstream.put_order("R1", OrderBuilder::new("R1").build());
        let downstream = FakeShippingPlatform::new();
        downstream.seed_shipment(shipped("s-1", vec![order_tag("R1")]));

        let outcome =
            reconciler(upstream, downstream).handle_shipment_confirmed("s-1").await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Updated {
                order_id: "R1".to_string(),
                tracking_number: "1Z999".to_string()
            }
        );
    }

    #[tokio::test]
    async fn second_push_for_same_number_is_skipped() {
        let upstream = FakeOrderPlatform::new();
        upstream.put_order("R1", OrderBuilder::new("R1").with_tracking("1Z999").build());
        let downstream = FakeShippingPlatform::new();
        downstream.seed_shipment(shipped("s-1", vec![order_tag("R1")]));

        let upstream_pushes = upstream.tracking_pushes();
        let outcome =
            reconciler(upstream, downstream).handle_shipment_confirmed("s-1").await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped { order_id: "R1".to_string() });
        assert_eq!(upstream_pushes.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn falls_back_to_linked_order_then_numeric_display() {
        let upstream = FakeOrderPlatform::new();
        upstream.put_order("R2", OrderBuilder::new("R2").build());
        let downstream = FakeShippingPlatform::new();
        downstream.seed_shipment(shipped("s-2", Vec::new()));
        downstream.link_order("s-2", "R2");

        let outcome = reconciler(upstream, downstream)
            .handle_shipment_confirmed("s-2")
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Updated { order_id, .. } if order_id == "R2"));

        let upstream = FakeOrderPlatform::new();
        upstream.put_order("12345", OrderBuilder::new("12345").build());
        let downstream = FakeShippingPlatform::new();
        let mut shipment = shipped("s-3", Vec::new());
        shipment.display_number = Some("12345".to_string());
        downstream.seed_shipment(shipment);

        let outcome = reconciler(upstream, downstream)
            .handle_shipment_confirmed("s-3")
            .await
            .unwrap();
        assert!(
            matches!(outcome, ReconcileOutcome::Updated { order_id, .. } if order_id == "12345")
        );
    }

    #[tokio::test]
    async fn unresolvable_when_no_reference_exists() {
        let downstream = FakeShippingPlatform::new();
        let mut shipment = shipped("s-4", Vec::new());
        shipment.display_number = Some("PO-ALPHA".to_string());
        downstream.seed_shipment(shipment);

        let outcome = reconciler(FakeOrderPlatform::new(), downstream)
            .handle_shipment_confirmed("s-4")
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unresolvable { .. }));
    }

    #[tokio::test]
    async fn label_fallback_supplies_tracking() {
        let upstream = FakeOrderPlatform::new();
        upstream.put_order("R1", OrderBuilder::new("R1").build());
        let downstream = FakeShippingPlatform::new();
        let mut shipment = shipped("s-5", vec![order_tag("R1")]);
        shipment.tracking_number = None;
        downstream.seed_shipment(shipment);
        downstream.add_label(
            "s-5",
            ShipmentLabel {
                tracking_number: "9400-LBL".to_string(),
                carrier_code: Some("stamps_com".to_string()),
                created_at: None,
            },
        );

        let outcome = reconciler(upstream, downstream)
            .handle_shipment_confirmed("s-5")
            .await
            .unwrap();
        assert!(
            matches!(outcome, ReconcileOutcome::Updated { tracking_number, .. } if tracking_number == "9400-LBL")
        );
    }

    #[tokio::test]
    async fn deleted_upstream_order_is_unresolvable() {
        let downstream = FakeShippingPlatform::new();
        downstream.seed_shipment(shipped("s-6", vec![order_tag("GONE")]));

        let outcome = reconciler(FakeOrderPlatform::new(), downstream)
            .handle_shipment_confirmed("s-6")
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Unresolvable { .. }));
    }
}
