//! Multi-strategy duplicate detection and idempotent shipment creation.
//!
//! The upstream feed is at-least-once, so the same order can arrive in
//! any number of cycles. Before creating, an ordered list of
//! [`IdentifierLookup`] strategies is consulted; the first hit wins and
//! the order is reported as existing rather than re-created.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use lading_core::{
    error::Result,
    models::{order_tag, DownstreamShipment, ShipmentCreate},
    platform::ShippingPlatform,
};

/// Identifiers a lookup strategy may match against.
#[derive(Debug, Clone)]
pub struct OrderIdentifiers {
    /// Upstream order id, the downstream external id.
    pub external_id: String,
    /// Human-facing reference, usually the PO number.
    pub display_number: String,
}

impl OrderIdentifiers {
    fn matches(&self, shipment: &DownstreamShipment) -> bool {
        shipment.external_id.as_deref() == Some(self.external_id.as_str())
            || shipment.display_number.as_deref() == Some(self.display_number.as_str())
            || shipment.tags.iter().any(|t| t == &order_tag(&self.external_id))
    }
}

/// One duplicate-lookup strategy. Strategies run in order and the first
/// match stops the chain.
#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    /// Strategy name, reported on the match.
    fn name(&self) -> &'static str;

    /// Finds an existing shipment for the identifiers, if any.
    async fn find(
        &self,
        platform: &dyn ShippingPlatform,
        ids: &OrderIdentifiers,
    ) -> Result<Option<DownstreamShipment>>;
}

/// Exact indexed lookup by external id. The fast path.
pub struct ExternalIdLookup;

#[async_trait]
impl IdentifierLookup for ExternalIdLookup {
    fn name(&self) -> &'static str {
        "external_id"
    }

    async fn find(
        &self,
        platform: &dyn ShippingPlatform,
        ids: &OrderIdentifiers,
    ) -> Result<Option<DownstreamShipment>> {
        platform.find_by_external_id(&ids.external_id).await
    }
}

/// Display-number search. The platform search is fuzzy, so results are
/// re-matched exactly against both identifiers.
pub struct DisplayNumberLookup;

#[async_trait]
impl IdentifierLookup for DisplayNumberLookup {
    fn name(&self) -> &'static str {
        "display_number"
    }

    async fn find(
        &self,
        platform: &dyn ShippingPlatform,
        ids: &OrderIdentifiers,
    ) -> Result<Option<DownstreamShipment>> {
        let candidates = platform.search_by_display_number(&ids.display_number).await?;
        Ok(candidates.into_iter().find(|s| ids.matches(s)))
    }
}

/// Bounded scan over the most recent shipments. The last resort for
/// platforms whose indexed lookups lag behind creation.
pub struct RecentWindowLookup {
    /// How many recent shipments to scan.
    pub limit: usize,
}

impl Default for RecentWindowLookup {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

#[async_trait]
impl IdentifierLookup for RecentWindowLookup {
    fn name(&self) -> &'static str {
        "recent_window"
    }

    async fn find(
        &self,
        platform: &dyn ShippingPlatform,
        ids: &OrderIdentifiers,
    ) -> Result<Option<DownstreamShipment>> {
        let recent = platform.recent_shipments(self.limit).await?;
        Ok(recent.into_iter().find(|s| ids.matches(s)))
    }
}

/// Outcome of [`IdempotentCreator::ensure_created`].
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    /// The shipment did not exist and was created.
    Created {
        /// The created shipment.
        shipment: DownstreamShipment,
        /// Whether the order-id tag landed. A false here degrades later
        /// reconciliation to the weaker lookups.
        tag_written: bool,
    },
    /// A prior cycle already created this shipment.
    Existing {
        /// Id of the existing shipment.
        shipment_id: String,
        /// Strategy that found it.
        matched_by: &'static str,
    },
}

/// Creates shipments at most once per upstream order.
pub struct IdempotentCreator<S> {
    platform: Arc<S>,
    lookups: Vec<Box<dyn IdentifierLookup>>,
}

impl<S: ShippingPlatform> IdempotentCreator<S> {
    /// Creates a creator with the standard three-strategy chain.
    pub fn new(platform: Arc<S>) -> Self {
        Self::with_lookups(
            platform,
            vec![
                Box::new(ExternalIdLookup),
                Box::new(DisplayNumberLookup),
                Box::new(RecentWindowLookup::default()),
            ],
        )
    }

    /// Creates a creator with an explicit strategy chain.
    pub fn with_lookups(platform: Arc<S>, lookups: Vec<Box<dyn IdentifierLookup>>) -> Self {
        Self { platform, lookups }
    }

    /// Creates the shipment unless one of the lookup strategies finds an
    /// existing one.
    ///
    /// A lookup failure does not proceed to creation; it propagates, so a
    /// flaky platform cannot cause a double create. The order-id tag is
    /// written again after creation and retried once; its failure is
    /// reported in the outcome but never fails the create.
    pub async fn ensure_created(&self, create: &ShipmentCreate) -> Result<CreateOutcome> {
        let ids = OrderIdentifiers {
            external_id: create.request.external_id.clone(),
            display_number: create.request.display_number.clone(),
        };

        for lookup in &self.lookups {
            if let Some(existing) = lookup.find(self.platform.as_ref(), &ids).await? {
                debug!(
                    external_id = %ids.external_id,
                    shipment_id = %existing.shipment_id,
                    matched_by = lookup.name(),
                    "duplicate detected, skipping create"
                );
                return Ok(CreateOutcome::Existing {
                    shipment_id: existing.shipment_id,
                    matched_by: lookup.name(),
                });
            }
        }

        let shipment = self.platform.create_shipment(create).await?;
        info!(
            external_id = %ids.external_id,
            shipment_id = %shipment.shipment_id,
            "shipment created"
        );

        let tag_written = self.write_tag(&shipment.shipment_id, &ids.external_id).await;
        Ok(CreateOutcome::Created { shipment, tag_written })
    }

    // Platforms drop tags supplied in the create payload often enough
    // that the tag is always written again explicitly.
    async fn write_tag(&self, shipment_id: &str, order_id: &str) -> bool {
        for attempt in 0..2 {
            match self.platform.write_order_tag(shipment_id, order_id).await {
                Ok(()) => return true,
                Err(error) if attempt == 0 && error.is_retryable() => {
                    warn!(shipment_id, %error, "order tag write failed, retrying once");
                }
                Err(error) => {
                    warn!(shipment_id, %error, "order tag write failed, reconciliation degraded");
                    return false;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use lading_core::error::SyncError;
    use lading_core::models::{
        CarrierId, CarrierPreference, NormalizedShipmentRequest, ResidentialIndicator,
        ShipmentAddress, ShipmentItem,
    };
    use lading_testing::FakeShippingPlatform;

    use super::*;

    fn create_for(external_id: &str, display_number: &str) -> ShipmentCreate {
        ShipmentCreate {
            request: NormalizedShipmentRequest {
                external_id: external_id.to_string(),
                display_number: display_number.to_string(),
                order_date: Utc::now(),
                currency_code: "USD".to_string(),
                amount_paid: Decimal::new(1000, 2),
                ship_to: ShipmentAddress {
                    name: "Pat Doe".to_string(),
                    line1: "1 Main St".to_string(),
                    line2: None,
                    city: "Austin".to_string(),
                    state: "TX".to_string(),
                    postal_code: "78701".to_string(),
                    country: "US".to_string(),
                    phone: "000-000-0000".to_string(),
                    residential: ResidentialIndicator::Unknown,
                },
                items: vec![ShipmentItem {
                    sku: "A1".to_string(),
                    quantity: 2,
                    unit_price: Decimal::new(500, 2),
                }],
                weight_oz: 6,
                package_code: Some("package".to_string()),
                service_code: Some("usps_ground_advantage".to_string()),
                carrier_preference: CarrierPreference::default(),
            },
            carrier_id: CarrierId::new("c1"),
            tags: vec![order_tag(external_id)],
        }
    }

    #[tokio::test]
    async fn second_call_reports_existing() {
        let platform = Arc::new(FakeShippingPlatform::new());
        let creator = IdempotentCreator::new(platform.clone());
        let create = create_for("R1", "PO1");

        let first = creator.ensure_created(&create).await.unwrap();
        assert!(matches!(first, CreateOutcome::Created { tag_written: true, .. }));

        let second = creator.ensure_created(&create).await.unwrap();
        match second {
            CreateOutcome::Existing { matched_by, .. } => assert_eq!(matched_by, "external_id"),
            other => panic!("expected existing, got {other:?}"),
        }
        assert_eq!(platform.created_count(), 1);
    }

    #[tokio::test]
    async fn display_number_match_requires_exact_identifier() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.seed_shipment(DownstreamShipment {
            shipment_id: "s-old".to_string(),
            external_id: Some("OTHER".to_string()),
            display_number: Some("PO1-SUFFIX".to_string()),
            ..DownstreamShipment::default()
        });

        let creator = IdempotentCreator::new(platform.clone());
        let outcome = creator.ensure_created(&create_for("R1", "PO1")).await.unwrap();
        assert!(matches!(outcome, CreateOutcome::Created { .. }));
        assert_eq!(platform.created_count(), 1);
    }

    #[tokio::test]
    async fn recent_window_catches_lagging_index() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.seed_unindexed_shipment(DownstreamShipment {
            shipment_id: "s-lag".to_string(),
            external_id: None,
            display_number: Some("PO1".to_string()),
            ..DownstreamShipment::default()
        });

        let creator = IdempotentCreator::new(platform.clone());
        let outcome = creator.ensure_created(&create_for("R1", "PO1")).await.unwrap();
        match outcome {
            CreateOutcome::Existing { shipment_id, matched_by } => {
                assert_eq!(shipment_id, "s-lag");
                // The fuzzy search serves from the index, so the match
                // comes from the bounded scan.
                assert_eq!(matched_by, "recent_window");
            }
            other => panic!("expected existing, got {other:?}"),
        }
        assert_eq!(platform.created_count(), 0);
    }

    #[tokio::test]
    async fn lookup_failure_does_not_create() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.fail_lookup(SyncError::transient("downstream", "search down"));

        let creator = IdempotentCreator::new(platform.clone());
        let err = creator.ensure_created(&create_for("R1", "PO1")).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(platform.created_count(), 0);
    }

    #[tokio::test]
    async fn tag_failure_is_reported_not_fatal() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.fail_tag_writes(SyncError::transient("downstream", "tags down"));

        let creator = IdempotentCreator::new(platform.clone());
        let outcome = creator.ensure_created(&create_for("R1", "PO1")).await.unwrap();
        match outcome {
            CreateOutcome::Created { tag_written, .. } => assert!(!tag_written),
            other => panic!("expected created, got {other:?}"),
        }
        assert_eq!(platform.created_count(), 1);
    }
}
