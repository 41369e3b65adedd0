//! Shipment weight aggregation.
//!
//! Per-item weight resolution chain: the item's own weight converted to
//! ounces, then the SKU weight catalog, then the configured default. The
//! aggregate is emitted in whole ounces, rounded up, minimum one.

use lading_core::models::SourceLineItem;

/// SKU-to-weight reference data, an external collaborator loaded outside
/// the mapper. Weights are per unit, in ounces.
pub trait WeightCatalog: Send + Sync {
    /// Per-unit weight for a SKU, if the catalog knows it.
    fn weight_oz(&self, sku: &str) -> Option<f64>;
}

/// Catalog that knows nothing; every item falls through to the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyWeightCatalog;

impl WeightCatalog for EmptyWeightCatalog {
    fn weight_oz(&self, _sku: &str) -> Option<f64> {
        None
    }
}

impl WeightCatalog for std::collections::HashMap<String, f64> {
    fn weight_oz(&self, sku: &str) -> Option<f64> {
        self.get(sku).copied()
    }
}

/// Resolves one item's per-unit weight in ounces.
pub fn item_weight_oz(
    item: &SourceLineItem,
    sku: &str,
    catalog: &dyn WeightCatalog,
    default_oz: f64,
) -> f64 {
    match (item.weight, item.weight_unit) {
        (Some(value), Some(unit)) if value > 0.0 => unit.to_ounces(value),
        // A bare weight with no unit was entered in ounces historically.
        (Some(value), None) if value > 0.0 => value,
        _ => catalog.weight_oz(sku).unwrap_or(default_oz),
    }
}

/// Rounds an aggregate weight up to whole ounces, minimum one.
pub fn finalize_oz(total: f64) -> u32 {
    let rounded = total.ceil();
    if rounded < 1.0 {
        1
    } else if rounded > f64::from(u32::MAX) {
        u32::MAX
    } else {
        // Bounds checked above.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            rounded as u32
        }
    }
}
