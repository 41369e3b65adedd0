use std::str::FromStr;

use rust_decimal::Decimal;

use lading_core::models::{
    LifecycleState, RequestedCarrier, SourceAddress, SourceLineItem, SourceOrder,
};

/// Builder for plausible upstream orders.
#[derive(Debug, Clone)]
pub struct OrderBuilder {
    order: SourceOrder,
}

impl OrderBuilder {
    /// Starts an order with just an id.
    pub fn new(order_id: &str) -> Self {
        Self {
            order: SourceOrder {
                order_id: Some(order_id.to_string()),
                ..SourceOrder::default()
            },
        }
    }

    /// Sets the PO number.
    pub fn with_po(mut self, po_number: &str) -> Self {
        self.order.po_number = Some(po_number.to_string());
        self
    }

    /// Marks the order acknowledged, the state the pipeline processes.
    pub fn acknowledged(mut self) -> Self {
        self.order.lifecycle = Some(LifecycleState::Acknowledged);
        self
    }

    /// Sets the lifecycle state explicitly.
    pub fn lifecycle(mut self, state: LifecycleState) -> Self {
        self.order.lifecycle = Some(state);
        self
    }

    /// Flags the order as a test order.
    pub fn test_order(mut self) -> Self {
        self.order.is_test = true;
        self
    }

    /// Attaches a complete, valid ship-to address.
    pub fn with_address(mut self) -> Self {
        self.order.ship_to = Some(SourceAddress {
            name: Some("Pat Doe".to_string()),
            line1: Some("1 Main St".to_string()),
            city: Some("Austin".to_string()),
            state: Some("TX".to_string()),
            postal_code: Some("78701".to_string()),
            country: Some("US".to_string()),
            phone: Some("512-555-0100".to_string()),
            ..SourceAddress::default()
        });
        self
    }

    /// Attaches a custom ship-to address.
    pub fn with_ship_to(mut self, address: SourceAddress) -> Self {
        self.order.ship_to = Some(address);
        self
    }

    /// Adds a line item with a unit cost given as a decimal string.
    pub fn with_item(mut self, sku: &str, quantity: i64, unit_cost: &str) -> Self {
        self.order.line_items.push(SourceLineItem {
            sku: Some(sku.to_string()),
            quantity: Some(quantity),
            unit_cost: Some(Decimal::from_str(unit_cost).expect("valid decimal literal")),
            ..SourceLineItem::default()
        });
        self
    }

    /// Adds a carrier request.
    pub fn with_requested_carrier(mut self, carrier: &str, service: Option<&str>, required: bool) -> Self {
        self.order.requested_carrier = Some(RequestedCarrier {
            carrier: Some(carrier.to_string()),
            service_level: service.map(str::to_string),
            is_required: required,
        });
        self
    }

    /// Records a tracking number as already pushed.
    pub fn with_tracking(mut self, tracking_number: &str) -> Self {
        self.order.tracking_numbers.push(tracking_number.to_string());
        self
    }

    /// Finishes the order.
    pub fn build(self) -> SourceOrder {
        self.order
    }
}
