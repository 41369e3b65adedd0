//! Order mapping: upstream record to normalized shipment request.
//!
//! Mapping is pure. Validation failures reject the order for the cycle
//! (reported, never retried); recoverable oddities become warnings and the
//! mapping proceeds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use lading_core::models::{
    CarrierPreference, LifecycleState, NormalizedShipmentRequest, ShipmentAddress, ShipmentItem,
    SourceOrder,
};

use crate::{
    resolve::{self, ResolvedDate},
    weight::{self, WeightCatalog},
    MapperConfig,
};

/// A reason an order is structurally unprocessable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    /// Neither an order id nor a PO number is present.
    #[error("order carries no usable identifier")]
    MissingIdentifier,
    /// The order id specifically is absent; nothing downstream can key it.
    #[error("order id is missing")]
    MissingOrderId,
    /// No shipping address block at all.
    #[error("shipping address is missing")]
    MissingAddress,
    /// An address block exists but a required subfield is empty.
    #[error("shipping address is missing required field `{0}`")]
    MissingAddressField(&'static str),
    /// The line-item list is absent or empty.
    #[error("order has no line items")]
    NoLineItems,
    /// Every line item failed quantity or SKU resolution.
    #[error("no line item resolves to a positive quantity and a SKU")]
    NoResolvableItems,
}

/// A recoverable oddity observed while mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapWarning {
    /// The first populated date field did not parse; current time used.
    InvalidDate(String),
    /// A line item had no SKU anywhere; one was synthesized.
    SynthesizedSku {
        /// Zero-based index of the item in the source order.
        index: usize,
        /// The synthesized SKU.
        sku: String,
    },
}

/// Why `should_process` declined an order. None of these are errors; the
/// order is simply outside this pipeline's responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Test order and the pipeline is configured to skip them.
    TestOrder,
    /// Lifecycle is terminal-cancelled.
    Cancelled,
    /// A shipment already exists upstream for this order.
    AlreadyShipped,
    /// Not yet acknowledged, or lifecycle could not be determined.
    NotReady,
}

/// Result of mapping one order.
#[derive(Debug, Clone)]
pub struct MappedOrder {
    /// The normalized request, present only when validation passed.
    pub request: Option<NormalizedShipmentRequest>,
    /// Validation failures; non-empty exactly when `request` is `None`.
    pub errors: Vec<ValidationIssue>,
    /// Recoverable oddities observed while mapping.
    pub warnings: Vec<MapWarning>,
}

/// Gate applied before mapping.
///
/// Only acknowledged orders proceed; records predating the lifecycle
/// field are admitted through the legacy status mapping.
pub fn should_process(order: &SourceOrder, config: &MapperConfig) -> Result<(), SkipReason> {
    if order.is_test && config.skip_test_orders {
        return Err(SkipReason::TestOrder);
    }
    match order.effective_lifecycle() {
        Some(LifecycleState::Cancelled) => Err(SkipReason::Cancelled),
        Some(LifecycleState::Shipped) => Err(SkipReason::AlreadyShipped),
        Some(LifecycleState::Acknowledged) => Ok(()),
        Some(LifecycleState::Created) | None => Err(SkipReason::NotReady),
    }
}

/// Maps one upstream order to a normalized shipment request.
///
/// `now` is injected so mapping stays pure and testable. Validation
/// failures are collected rather than short-circuited, so a rejected
/// order reports everything wrong with it at once.
pub fn map(
    order: &SourceOrder,
    config: &MapperConfig,
    catalog: &dyn WeightCatalog,
    now: DateTime<Utc>,
) -> MappedOrder {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let order_id = order.order_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let po_number = order.po_number.as_deref().map(str::trim).filter(|s| !s.is_empty());
    match (order_id, po_number) {
        (None, None) => errors.push(ValidationIssue::MissingIdentifier),
        (None, Some(_)) => errors.push(ValidationIssue::MissingOrderId),
        _ => {},
    }

    let ship_to = match resolve::address_block(order, config.prefer_legacy_address) {
        None => {
            errors.push(ValidationIssue::MissingAddress);
            None
        },
        Some(block) => {
            let mut require = |field: Option<&str>, name: &'static str| {
                let present = field.map(str::trim).is_some_and(|s| !s.is_empty());
                if !present {
                    errors.push(ValidationIssue::MissingAddressField(name));
                }
                present
            };
            let complete = require(block.line1.as_deref(), "line1")
                & require(block.city.as_deref(), "city")
                & require(block.state.as_deref(), "state")
                & require(block.postal_code.as_deref(), "postal_code");
            complete.then(|| ShipmentAddress {
                name: resolve::customer_name(block),
                line1: block.line1.clone().unwrap_or_default(),
                line2: block.line2.clone().filter(|s| !s.trim().is_empty()),
                city: block.city.clone().unwrap_or_default(),
                state: block.state.clone().unwrap_or_default(),
                postal_code: block.postal_code.clone().unwrap_or_default(),
                country: block
                    .country
                    .clone()
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| config.domestic_country.clone()),
                phone: resolve::phone(block, &config.placeholder_phone),
                residential: resolve::residential(block),
            })
        },
    };

    if order.line_items.is_empty() {
        errors.push(ValidationIssue::NoLineItems);
    }

    let mut items = Vec::new();
    let mut item_total = Decimal::ZERO;
    let mut weight_total = 0.0_f64;
    for (index, line) in order.line_items.iter().enumerate() {
        let qty = resolve::quantity(line);
        if qty <= 0 {
            // Zero-quantity lines are legitimate (fully rejected lines);
            // dropping them is not an error.
            continue;
        }
        let sku = match resolve::sku(line) {
            Some(sku) => sku.to_string(),
            None => {
                let synthesized = format!("ITEM-{index}");
                warn!(order_id = order_id.unwrap_or("?"), index, "synthesizing SKU for line item");
                warnings
                    .push(MapWarning::SynthesizedSku { index, sku: synthesized.clone() });
                synthesized
            },
        };
        let unit_price = line.unit_cost.unwrap_or_default();
        item_total += unit_price * Decimal::from(qty);
        weight_total += weight::item_weight_oz(line, &sku, catalog, config.default_item_weight_oz)
            * qty as f64;

        let quantity = u32::try_from(qty).unwrap_or(u32::MAX);
        items.push(ShipmentItem { sku, quantity, unit_price });
    }

    if !order.line_items.is_empty() && items.is_empty() {
        errors.push(ValidationIssue::NoResolvableItems);
    }

    if !errors.is_empty() {
        return MappedOrder { request: None, errors, warnings };
    }

    let order_date = match resolve::order_date(order) {
        ResolvedDate::Parsed(dt) => dt,
        ResolvedDate::Missing => now,
        ResolvedDate::Invalid(raw) => {
            warn!(order_id = order_id.unwrap_or("?"), raw, "unparseable order date, using now");
            warnings.push(MapWarning::InvalidDate(raw));
            now
        },
    };

    let external_id = order_id.expect("validated above").to_string();
    let display_number = po_number.unwrap_or(&external_id).to_string();

    let carrier_preference = order.requested_carrier.as_ref().map_or_else(
        CarrierPreference::default,
        |req| CarrierPreference {
            carrier: req.carrier.as_deref().map(str::trim).filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            service_level: req.service_level.as_deref().map(str::trim).filter(|s| !s.is_empty())
                .map(str::to_lowercase),
            is_required: req.is_required,
        },
    );

    MappedOrder {
        request: Some(NormalizedShipmentRequest {
            external_id,
            display_number,
            order_date,
            currency_code: resolve::currency(order),
            amount_paid: resolve::amount_paid(order, item_total),
            ship_to: ship_to.expect("validated above"),
            items,
            weight_oz: weight::finalize_oz(weight_total),
            package_code: None,
            service_code: None,
            carrier_preference,
        }),
        errors,
        warnings,
    }
}
