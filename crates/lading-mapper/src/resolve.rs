//! Ordered, typed fallback resolution for upstream order fields.
//!
//! Upstream records arrive with wildly uneven field population, so every
//! mapped field has an explicit precedence chain here instead of inline
//! `a || b || c` defaults scattered through the mapper. Each resolver
//! documents its chain and is tested on its own.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;

use lading_core::models::{ResidentialIndicator, SourceAddress, SourceLineItem, SourceOrder};

/// Outcome of the order-date chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedDate {
    /// A date field parsed cleanly.
    Parsed(DateTime<Utc>),
    /// No date field was populated; the caller uses the current time.
    Missing,
    /// The first populated field did not parse; the caller uses the
    /// current time and records a warning.
    Invalid(String),
}

/// Resolves the order date.
///
/// Chain: consumer order date, retailer create date, internal create
/// date. The first non-empty value is the one that counts: if it fails to
/// parse, the result is `Invalid` rather than trying later fields, so a
/// malformed primary date is visible instead of silently superseded.
pub fn order_date(order: &SourceOrder) -> ResolvedDate {
    let candidate = [
        order.consumer_order_date.as_deref(),
        order.retailer_create_date.as_deref(),
        order.internal_create_date.as_deref(),
    ]
    .into_iter()
    .flatten()
    .find(|s| !s.trim().is_empty());

    match candidate {
        None => ResolvedDate::Missing,
        Some(raw) => match parse_date(raw) {
            Some(parsed) => ResolvedDate::Parsed(parsed),
            None => ResolvedDate::Invalid(raw.to_string()),
        },
    }
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Resolves the currency code: explicit value, else `USD`. Always
/// uppercase.
pub fn currency(order: &SourceOrder) -> String {
    order
        .currency_code
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map_or_else(|| "USD".to_string(), str::to_uppercase)
}

/// Resolves the amount paid.
///
/// Item-cost total plus shipping surcharge plus tax, each defaulting to
/// zero. When that sum is exactly zero the upstream order total, if
/// present, is used instead. `item_total` is computed by the caller from
/// resolved quantities.
pub fn amount_paid(order: &SourceOrder, item_total: Decimal) -> Decimal {
    let sum = item_total
        + order.shipping_surcharge.unwrap_or_default()
        + order.tax_total.unwrap_or_default();
    if sum.is_zero() {
        order.order_total.unwrap_or_default()
    } else {
        sum
    }
}

/// Resolves the customer display name.
///
/// Chain: explicit name, first+last, first name alone, literal
/// `Customer`.
pub fn customer_name(address: &SourceAddress) -> String {
    if let Some(name) = non_empty(address.name.as_deref()) {
        return name.to_string();
    }
    match (non_empty(address.first_name.as_deref()), non_empty(address.last_name.as_deref())) {
        (Some(first), Some(last)) => format!("{first} {last}"),
        (Some(first), None) => first.to_string(),
        _ => "Customer".to_string(),
    }
}

/// Resolves the residential indicator. Anything other than an explicit
/// `yes`/`no`/`unknown` becomes `Unknown`.
pub fn residential(address: &SourceAddress) -> ResidentialIndicator {
    match address.residential.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref() {
        Some("yes") => ResidentialIndicator::Yes,
        Some("no") => ResidentialIndicator::No,
        _ => ResidentialIndicator::Unknown,
    }
}

/// Resolves the contact phone, substituting the configured placeholder
/// when absent. The shipping platform rejects empty phones.
pub fn phone(address: &SourceAddress, placeholder: &str) -> String {
    non_empty(address.phone.as_deref()).map_or_else(|| placeholder.to_string(), str::to_string)
}

/// Resolves a line-item quantity.
///
/// The accepted-quantity override is trusted only when positive;
/// otherwise the requested quantity; otherwise zero. Items resolving to
/// zero or less are dropped by the mapper, not erred.
pub fn quantity(item: &SourceLineItem) -> i64 {
    match item.accepted_quantity {
        Some(accepted) if accepted > 0 => accepted,
        _ => item.quantity.unwrap_or(0),
    }
}

/// Resolves a line-item SKU.
///
/// Chain: sku, partner sku, product group. `None` means the caller must
/// synthesize `ITEM-{index}` and record a warning.
pub fn sku(item: &SourceLineItem) -> Option<&str> {
    non_empty(item.sku.as_deref())
        .or_else(|| non_empty(item.partner_sku.as_deref()))
        .or_else(|| non_empty(item.product_group.as_deref()))
}

/// Picks the address block to map from.
///
/// The platform has shipped records under both a current `ship_to` key
/// and a legacy `shipping` key; which one wins is configuration. The
/// non-preferred block is still used when the preferred one is absent.
pub fn address_block(order: &SourceOrder, prefer_legacy: bool) -> Option<&SourceAddress> {
    if prefer_legacy {
        order.shipping.as_ref().or(order.ship_to.as_ref())
    } else {
        order.ship_to.as_ref().or(order.shipping.as_ref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> SourceAddress {
        SourceAddress::default()
    }

    #[test]
    fn order_date_prefers_consumer_date() {
        let order = SourceOrder {
            consumer_order_date: Some("2024-03-01T10:00:00Z".to_string()),
            retailer_create_date: Some("2024-01-01T00:00:00Z".to_string()),
            ..SourceOrder::default()
        };
        let ResolvedDate::Parsed(dt) = order_date(&order) else {
            panic!("expected parsed date");
        };
        assert_eq!(dt.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn order_date_skips_empty_fields() {
        let order = SourceOrder {
            consumer_order_date: Some("  ".to_string()),
            retailer_create_date: Some("2024-01-02".to_string()),
            ..SourceOrder::default()
        };
        assert!(matches!(order_date(&order), ResolvedDate::Parsed(_)));
    }

    #[test]
    fn invalid_date_is_reported_not_superseded() {
        let order = SourceOrder {
            consumer_order_date: Some("yesterday".to_string()),
            retailer_create_date: Some("2024-01-02".to_string()),
            ..SourceOrder::default()
        };
        assert_eq!(order_date(&order), ResolvedDate::Invalid("yesterday".to_string()));
    }

    #[test]
    fn missing_dates_resolve_missing() {
        assert_eq!(order_date(&SourceOrder::default()), ResolvedDate::Missing);
    }

    #[test]
    fn currency_defaults_to_usd_uppercase() {
        assert_eq!(currency(&SourceOrder::default()), "USD");

        let order =
            SourceOrder { currency_code: Some("cad".to_string()), ..SourceOrder::default() };
        assert_eq!(currency(&order), "CAD");
    }

    #[test]
    fn amount_paid_falls_back_to_order_total_on_zero_sum() {
        let order = SourceOrder {
            order_total: Some(Decimal::new(995, 2)),
            ..SourceOrder::default()
        };
        assert_eq!(amount_paid(&order, Decimal::ZERO), Decimal::new(995, 2));
        assert_eq!(amount_paid(&order, Decimal::from(10)), Decimal::from(10));
    }

    #[test]
    fn amount_paid_sums_components() {
        let order = SourceOrder {
            shipping_surcharge: Some(Decimal::from(5)),
            tax_total: Some(Decimal::from(2)),
            order_total: Some(Decimal::from(99)),
            ..SourceOrder::default()
        };
        assert_eq!(amount_paid(&order, Decimal::from(10)), Decimal::from(17));
    }

    #[test]
    fn customer_name_chain() {
        let mut addr = address();
        assert_eq!(customer_name(&addr), "Customer");

        addr.first_name = Some("Ada".to_string());
        assert_eq!(customer_name(&addr), "Ada");

        addr.last_name = Some("Lovelace".to_string());
        assert_eq!(customer_name(&addr), "Ada Lovelace");

        addr.name = Some("A. Lovelace".to_string());
        assert_eq!(customer_name(&addr), "A. Lovelace");
    }

    #[test]
    fn residential_defaults_to_unknown() {
        let mut addr = address();
        assert_eq!(residential(&addr), ResidentialIndicator::Unknown);

        addr.residential = Some("YES".to_string());
        assert_eq!(residential(&addr), ResidentialIndicator::Yes);

        addr.residential = Some("maybe".to_string());
        assert_eq!(residential(&addr), ResidentialIndicator::Unknown);
    }

    #[test]
    fn phone_placeholder_when_absent() {
        let mut addr = address();
        assert_eq!(phone(&addr, "000-000-0000"), "000-000-0000");

        addr.phone = Some("555-0100".to_string());
        assert_eq!(phone(&addr, "000-000-0000"), "555-0100");
    }

    #[test]
    fn quantity_trusts_only_positive_override() {
        let item = SourceLineItem {
            quantity: Some(4),
            accepted_quantity: Some(2),
            ..SourceLineItem::default()
        };
        assert_eq!(quantity(&item), 2);

        let item = SourceLineItem {
            quantity: Some(4),
            accepted_quantity: Some(0),
            ..SourceLineItem::default()
        };
        assert_eq!(quantity(&item), 4);

        let item = SourceLineItem {
            quantity: Some(4),
            accepted_quantity: Some(-1),
            ..SourceLineItem::default()
        };
        assert_eq!(quantity(&item), 4);

        assert_eq!(quantity(&SourceLineItem::default()), 0);
    }

    #[test]
    fn sku_chain_ends_in_none() {
        let item = SourceLineItem {
            sku: Some("  ".to_string()),
            partner_sku: Some("P-1".to_string()),
            product_group: Some("G-1".to_string()),
            ..SourceLineItem::default()
        };
        assert_eq!(sku(&item), Some("P-1"));

        assert_eq!(sku(&SourceLineItem::default()), None);
    }

    #[test]
    fn address_block_precedence_is_configurable() {
        let current = SourceAddress { city: Some("Portland".to_string()), ..address() };
        let legacy = SourceAddress { city: Some("Salem".to_string()), ..address() };
        let order = SourceOrder {
            ship_to: Some(current),
            shipping: Some(legacy),
            ..SourceOrder::default()
        };

        assert_eq!(address_block(&order, false).unwrap().city.as_deref(), Some("Portland"));
        assert_eq!(address_block(&order, true).unwrap().city.as_deref(), Some("Salem"));

        let only_legacy = SourceOrder {
            shipping: Some(SourceAddress { city: Some("Salem".to_string()), ..address() }),
            ..SourceOrder::default()
        };
        assert_eq!(address_block(&only_legacy, false).unwrap().city.as_deref(), Some("Salem"));
    }
}
