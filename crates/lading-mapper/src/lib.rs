//! Normalizes heterogeneous upstream order records into shipment-creation
//! requests.
//!
//! The mapper is pure: no I/O, no clock reads. Field population varies by
//! retailer and by platform era, so every mapped field has an explicit,
//! ordered fallback chain in [`resolve`], and the SKU weight reference is
//! injected as a [`weight::WeightCatalog`] collaborator.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

pub mod map;
pub mod resolve;
pub mod weight;

pub use map::{map, should_process, MapWarning, MappedOrder, SkipReason, ValidationIssue};
pub use weight::{EmptyWeightCatalog, WeightCatalog};

/// Mapper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Skip orders flagged as test orders upstream.
    pub skip_test_orders: bool,
    /// Prefer the legacy `shipping` address block over `ship_to`. The
    /// platform shipped both shapes over its lifetime; precedence is
    /// deployment configuration, not code.
    pub prefer_legacy_address: bool,
    /// Per-unit weight assumed for items with no weight anywhere, in
    /// ounces.
    pub default_item_weight_oz: f64,
    /// Phone substituted when the address has none; the shipping platform
    /// rejects empty phones.
    pub placeholder_phone: String,
    /// Country assumed when the address has none.
    pub domestic_country: String,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            skip_test_orders: true,
            prefer_legacy_address: false,
            default_item_weight_oz: 3.0,
            placeholder_phone: "000-000-0000".to_string(),
            domestic_country: "US".to_string(),
        }
    }
}
