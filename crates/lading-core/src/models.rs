//! Core domain models for order synchronization.
//!
//! Defines the upstream order record, the event stream envelope, the
//! normalized shipment request handed to the shipping platform, and the
//! downstream shipment record used for duplicate detection and tracking
//! reconciliation. Wire formats are camelCase JSON on both platforms, so
//! serde attributes live directly on these types.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Strongly-typed stream identifier.
///
/// One checkpoint exists per stream; the stream id keys both the event
/// feed requests and the checkpoint record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    /// Creates a stream id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Strongly-typed downstream carrier identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CarrierId(pub String);

impl CarrierId {
    /// Creates a carrier id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for CarrierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why an event was emitted on the upstream stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventReason {
    /// A new object was created upstream.
    Create,
    /// An existing object changed.
    Update,
    /// The object was removed upstream.
    Delete,
}

impl fmt::Display for EventReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One entry in the upstream append-only event feed.
///
/// Event ids are strictly increasing within a stream partition and define
/// the checkpoint ordering. Events for the same `object_id` may repeat;
/// the feed is at-least-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamEvent {
    /// Monotonic position token within the stream partition.
    pub id: u64,
    /// Upstream identifier of the object the event refers to.
    pub object_id: String,
    /// Object kind, e.g. `order`.
    pub object_type: String,
    /// What happened to the object.
    pub event_reason: EventReason,
    /// When the event was recorded upstream.
    pub timestamp: DateTime<Utc>,
}

/// A page of events returned by the upstream feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    /// Events after the requested position, in id order.
    pub events: Vec<StreamEvent>,
    /// Position to request the next page from, when the feed provides one.
    ///
    /// The consumer does not checkpoint against this cursor: it points past
    /// the whole page, and the checkpoint must stop at the last event whose
    /// handling resolved. The commit position is therefore derived from
    /// event ids, which the feed guarantees are usable as positions.
    pub next_position: Option<u64>,
}

/// Order lifecycle on the source platform.
///
/// The expected path is `created -> acknowledged -> shipped`; `cancelled`
/// is terminal from any non-terminal state. Only `acknowledged` orders are
/// eligible for shipment creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Order placed, not yet confirmed by the retailer.
    Created,
    /// Confirmed and ready to ship.
    Acknowledged,
    /// A shipment already exists for this order.
    Shipped,
    /// Terminal; never shipped.
    Cancelled,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Shipped => write!(f, "shipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Weight unit on an upstream line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightUnit {
    /// Kilograms.
    Kg,
    /// Grams.
    G,
    /// Pounds.
    Lb,
    /// Ounces.
    Oz,
}

impl WeightUnit {
    /// Converts a value in this unit to ounces.
    pub fn to_ounces(self, value: f64) -> f64 {
        match self {
            Self::Kg => value * 35.27396,
            Self::G => value * 0.03527396,
            Self::Lb => value * 16.0,
            Self::Oz => value,
        }
    }
}

/// Shipping address as the source platform provides it.
///
/// Everything is optional at the wire level; the mapper decides what is
/// required and what falls back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceAddress {
    /// Full display name, when the platform provides one.
    pub name: Option<String>,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Company line.
    pub company: Option<String>,
    /// Street line 1.
    pub line1: Option<String>,
    /// Street line 2.
    pub line2: Option<String>,
    /// City.
    pub city: Option<String>,
    /// State or region.
    pub state: Option<String>,
    /// Postal code.
    pub postal_code: Option<String>,
    /// ISO country code; absent means domestic.
    pub country: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Residential indicator as sent upstream: `yes`, `no`, or `unknown`.
    pub residential: Option<String>,
}

/// One line of an upstream order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceLineItem {
    /// Primary SKU.
    pub sku: Option<String>,
    /// Partner-assigned SKU, used when the primary is missing.
    pub partner_sku: Option<String>,
    /// Product group code, the last SKU fallback before synthesis.
    pub product_group: Option<String>,
    /// Requested quantity.
    pub quantity: Option<i64>,
    /// Accepted-quantity override; only trusted when positive.
    pub accepted_quantity: Option<i64>,
    /// Unit cost in the order currency.
    pub unit_cost: Option<Decimal>,
    /// Per-unit weight in `weight_unit`.
    pub weight: Option<f64>,
    /// Unit for `weight`.
    pub weight_unit: Option<WeightUnit>,
}

/// Carrier request attached to an upstream order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestedCarrier {
    /// Carrier name or code the retailer asked for.
    pub carrier: Option<String>,
    /// Service-level code the retailer asked for.
    pub service_level: Option<String>,
    /// When true, deviating from the requested carrier is not acceptable.
    pub is_required: bool,
}

/// Upstream order record.
///
/// Field population varies by retailer; most fields are optional and the
/// mapper owns the fallback rules. `order_id` is the one hard requirement:
/// without it no processing happens. The record is read-only to this
/// system except for the final tracking push.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceOrder {
    /// Immutable, globally unique order identifier. Required.
    pub order_id: Option<String>,
    /// Display identifier; may collide across orders.
    pub po_number: Option<String>,
    /// Current lifecycle state.
    pub lifecycle: Option<LifecycleState>,
    /// Legacy numeric/string status for records predating `lifecycle`.
    pub legacy_status: Option<String>,
    /// Marked as a test order upstream.
    pub is_test: bool,
    /// Current-style shipping address block.
    pub ship_to: Option<SourceAddress>,
    /// Legacy-style shipping address block.
    pub shipping: Option<SourceAddress>,
    /// Explicit currency code.
    pub currency_code: Option<String>,
    /// Shipping surcharge amount.
    pub shipping_surcharge: Option<Decimal>,
    /// Tax total.
    pub tax_total: Option<Decimal>,
    /// Upstream order total, the fallback when the computed sum is zero.
    pub order_total: Option<Decimal>,
    /// Date the consumer placed the order.
    pub consumer_order_date: Option<String>,
    /// Date the retailer created the record.
    pub retailer_create_date: Option<String>,
    /// Date the record entered the source platform.
    pub internal_create_date: Option<String>,
    /// Order lines.
    pub line_items: Vec<SourceLineItem>,
    /// Carrier request, when the retailer made one.
    pub requested_carrier: Option<RequestedCarrier>,
    /// Tracking numbers already pushed to this order.
    pub tracking_numbers: Vec<String>,
}

impl SourceOrder {
    /// Lifecycle after mapping legacy status values.
    ///
    /// Records predating the lifecycle field carry a legacy status string;
    /// the value equivalent to a confirmed order maps to `Acknowledged`.
    pub fn effective_lifecycle(&self) -> Option<LifecycleState> {
        if let Some(state) = self.lifecycle {
            return Some(state);
        }
        match self.legacy_status.as_deref() {
            Some("released") | Some("accepted") => Some(LifecycleState::Acknowledged),
            Some("new") => Some(LifecycleState::Created),
            Some("complete") => Some(LifecycleState::Shipped),
            Some("void") => Some(LifecycleState::Cancelled),
            _ => None,
        }
    }
}

/// Residential indicator on the normalized address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResidentialIndicator {
    /// Known residential destination.
    Yes,
    /// Known commercial destination.
    No,
    /// Not stated upstream.
    Unknown,
}

/// Address on a normalized shipment request. All required fields resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentAddress {
    /// Customer display name, never empty.
    pub name: String,
    /// Street line 1.
    pub line1: String,
    /// Street line 2.
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or region.
    pub state: String,
    /// Postal code.
    pub postal_code: String,
    /// ISO country code.
    pub country: String,
    /// Contact phone, never empty (downstream rejects empty phones).
    pub phone: String,
    /// Residential indicator.
    pub residential: ResidentialIndicator,
}

/// One resolved line on a normalized shipment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentItem {
    /// Resolved SKU; synthesized when the order carried none.
    pub sku: String,
    /// Resolved quantity, always positive.
    pub quantity: u32,
    /// Unit price in the order currency.
    pub unit_price: Decimal,
}

/// Preference signals extracted from the upstream order, carried along so
/// carrier selection can honor them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarrierPreference {
    /// Requested carrier name, lowercased.
    pub carrier: Option<String>,
    /// Requested service-level code, lowercased.
    pub service_level: Option<String>,
    /// Whether deviation from the requested carrier is acceptable.
    pub is_required: bool,
}

/// Normalized shipment-creation request, the mapper's output.
///
/// `external_id` equals the upstream order id and is the downstream
/// deduplication key. `package_code` and `service_code` are filled in by
/// carrier selection, after mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedShipmentRequest {
    /// Stable deduplication key, equal to the upstream order id.
    pub external_id: String,
    /// Human-facing reference, usually the PO number.
    pub display_number: String,
    /// Resolved order date.
    pub order_date: DateTime<Utc>,
    /// Resolved currency code, uppercase.
    pub currency_code: String,
    /// Resolved amount paid.
    pub amount_paid: Decimal,
    /// Resolved destination address.
    pub ship_to: ShipmentAddress,
    /// Resolved lines; every quantity is positive.
    pub items: Vec<ShipmentItem>,
    /// Aggregate weight in whole ounces, rounded up, minimum 1.
    pub weight_oz: u32,
    /// Package code, derived during carrier selection.
    pub package_code: Option<String>,
    /// Service code, derived during carrier selection.
    pub service_code: Option<String>,
    /// Preference signals for carrier selection.
    pub carrier_preference: CarrierPreference,
}

/// A carrier the shipping platform can hand shipments to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carrier {
    /// Downstream carrier identifier.
    pub id: CarrierId,
    /// Short code, e.g. `ups`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Whether the carrier is active for this account.
    pub active: bool,
}

/// Shipment record on the shipping platform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DownstreamShipment {
    /// Platform-assigned shipment identifier.
    pub shipment_id: String,
    /// External id supplied at creation; globally unique downstream.
    pub external_id: Option<String>,
    /// Human-facing reference supplied at creation.
    pub display_number: Option<String>,
    /// Platform status string, e.g. `shipped`.
    pub status: Option<String>,
    /// Assigned carrier code.
    pub carrier_code: Option<String>,
    /// Service code the shipment was created with.
    pub service_code: Option<String>,
    /// Package code the shipment was created with.
    pub package_code: Option<String>,
    /// Weight in ounces.
    pub weight_oz: Option<u32>,
    /// Tracking number, once the shipment ships.
    pub tracking_number: Option<String>,
    /// Ship date, once the shipment ships.
    pub ship_date: Option<DateTime<Utc>>,
    /// Tags on the shipment; the upstream order id rides here.
    pub tags: Vec<String>,
}

/// Label attached to a shipment, the fallback source of tracking data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentLabel {
    /// Tracking number printed on the label.
    pub tracking_number: String,
    /// Carrier code the label was purchased for.
    pub carrier_code: Option<String>,
    /// When the label was created.
    pub created_at: Option<DateTime<Utc>>,
}

/// Shipment-creation payload handed to the shipping platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentCreate {
    /// Normalized request with package and service codes resolved.
    pub request: NormalizedShipmentRequest,
    /// Carrier chosen by selection.
    pub carrier_id: CarrierId,
    /// Tags to set at creation; includes the order-id tag.
    pub tags: Vec<String>,
}

/// Tracking update pushed back to the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    /// Tracking number assigned by the carrier.
    pub tracking_number: String,
    /// Carrier code, when known.
    pub carrier_code: Option<String>,
    /// Ship date, when known.
    pub ship_date: Option<DateTime<Utc>>,
}

/// Tag prefix carrying the upstream order id on downstream shipments.
pub const ORDER_TAG_PREFIX: &str = "order:";

/// Builds the order-id tag stored on created shipments.
pub fn order_tag(order_id: &str) -> String {
    format!("{ORDER_TAG_PREFIX}{order_id}")
}

/// Extracts the upstream order id from a shipment tag set, if present.
pub fn order_id_from_tags(tags: &[String]) -> Option<&str> {
    tags.iter().find_map(|t| t.strip_prefix(ORDER_TAG_PREFIX)).filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_status_maps_to_lifecycle() {
        let order = SourceOrder {
            legacy_status: Some("released".to_string()),
            ..SourceOrder::default()
        };
        assert_eq!(order.effective_lifecycle(), Some(LifecycleState::Acknowledged));

        let order = SourceOrder { legacy_status: Some("void".to_string()), ..SourceOrder::default() };
        assert_eq!(order.effective_lifecycle(), Some(LifecycleState::Cancelled));
    }

    #[test]
    fn explicit_lifecycle_wins_over_legacy_status() {
        let order = SourceOrder {
            lifecycle: Some(LifecycleState::Shipped),
            legacy_status: Some("released".to_string()),
            ..SourceOrder::default()
        };
        assert_eq!(order.effective_lifecycle(), Some(LifecycleState::Shipped));
    }

    #[test]
    fn weight_unit_conversions_to_ounces() {
        assert!((WeightUnit::Lb.to_ounces(1.0) - 16.0).abs() < 1e-9);
        assert!((WeightUnit::Kg.to_ounces(1.0) - 35.27396).abs() < 1e-6);
        assert!((WeightUnit::G.to_ounces(1000.0) - 35.27396).abs() < 1e-4);
        assert!((WeightUnit::Oz.to_ounces(3.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn order_tag_round_trips() {
        let tags = vec!["priority".to_string(), order_tag("R1")];
        assert_eq!(order_id_from_tags(&tags), Some("R1"));
        assert_eq!(order_id_from_tags(&["priority".to_string()]), None);
        assert_eq!(order_id_from_tags(&["order:".to_string()]), None);
    }
}
