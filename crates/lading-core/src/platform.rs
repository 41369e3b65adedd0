//! Interface boundaries to the two external platforms.
//!
//! The pipeline talks to the order-management platform and the shipping
//! platform only through these traits. `lading-clients` implements them
//! over HTTP; `lading-testing` provides in-memory fakes so pipeline
//! behavior is testable without a network.

use async_trait::async_trait;

use crate::{
    error::Result,
    models::{
        Carrier, DownstreamShipment, EventPage, ShipmentCreate, ShipmentLabel, SourceOrder,
        StreamId, TrackingUpdate,
    },
};

/// The source order-management platform: event feed, order bodies, and
/// the tracking write-back.
#[async_trait]
pub trait OrderPlatform: Send + Sync {
    /// Fetches events after `position` (`None` for the stream start).
    ///
    /// Returns `SyncError::StreamNotFound` when the stream token has been
    /// deleted or rotated upstream; that is terminal for the stream.
    async fn events_since(&self, stream_id: &StreamId, position: Option<u64>)
        -> Result<EventPage>;

    /// Fetches the full order body.
    ///
    /// Returns `SyncError::OrderNotFound` when the order was deleted
    /// upstream before it could be fetched.
    async fn fetch_order(&self, order_id: &str) -> Result<SourceOrder>;

    /// Pushes a tracking update onto an order.
    async fn push_tracking(&self, order_id: &str, update: &TrackingUpdate) -> Result<()>;
}

/// The downstream shipping platform.
#[async_trait]
pub trait ShippingPlatform: Send + Sync {
    /// Lists the carriers available on this account.
    async fn carriers(&self) -> Result<Vec<Carrier>>;

    /// Creates a shipment (and its sales order) from a normalized request.
    async fn create_shipment(&self, create: &ShipmentCreate) -> Result<DownstreamShipment>;

    /// Fast indexed lookup by external id.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<DownstreamShipment>>;

    /// Searches recent shipments by display number. The platform search is
    /// fuzzy; callers must match exactly against the results.
    async fn search_by_display_number(
        &self,
        display_number: &str,
    ) -> Result<Vec<DownstreamShipment>>;

    /// Most recent shipments, newest first, bounded by `limit`.
    async fn recent_shipments(&self, limit: usize) -> Result<Vec<DownstreamShipment>>;

    /// Fetches one shipment by its platform id.
    async fn get_shipment(&self, shipment_id: &str) -> Result<DownstreamShipment>;

    /// The upstream order reference stored on the shipment's linked sales
    /// order custom field, if any.
    async fn linked_order_reference(&self, shipment_id: &str) -> Result<Option<String>>;

    /// Labels purchased for a shipment, the fallback source of tracking
    /// data when the shipment record itself lacks it.
    async fn shipment_labels(&self, shipment_id: &str) -> Result<Vec<ShipmentLabel>>;

    /// Writes the order-id tag onto an existing shipment.
    ///
    /// Platforms do not reliably persist tags supplied at creation time,
    /// so this is called again after create and retried independently.
    async fn write_order_tag(&self, shipment_id: &str, order_id: &str) -> Result<()>;
}
