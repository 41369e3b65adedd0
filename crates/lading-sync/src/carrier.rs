//! Carrier selection, package banding and service derivation.
//!
//! Selection is preference-driven: a required upstream carrier that is
//! present, active and satisfies the requested service level wins
//! outright; everything else goes through a rank-weighted scoring pass
//! over the cached carrier list. Selection never returns nothing, the
//! configured fallback carrier absorbs empty lists and fetch failures.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use lading_core::{
    models::{Carrier, CarrierId, CarrierPreference, NormalizedShipmentRequest},
    platform::ShippingPlatform,
    time::Clock,
};

const EXPEDITED_KEYWORDS: &[&str] = &["express", "expedited", "overnight", "priority", "next day", "2day", "2nd day"];

/// Selector tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Carrier list cache lifetime.
    #[serde(with = "ttl_seconds")]
    pub cache_ttl: Duration,
    /// Carrier used when the list is empty or unreachable.
    pub fallback_carrier: CarrierId,
    /// Preferred carrier codes, best first.
    pub preferred_codes: Vec<String>,
    /// Preferred service-name substrings, best first.
    pub preferred_services: Vec<String>,
    /// Carriers never selected by scoring.
    pub avoid: Vec<String>,
    /// Codes moved to the front for non-domestic destinations.
    pub international_codes: Vec<String>,
    /// Codes moved to the front when the requested service sounds fast.
    pub expedited_codes: Vec<String>,
    /// Codes moved to the front for high-value orders.
    pub high_value_codes: Vec<String>,
    /// Order total at which the high-value bias applies.
    pub high_value_threshold: Decimal,
    /// Country treated as domestic.
    pub domestic_country: String,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            fallback_carrier: CarrierId::new("stamps_com"),
            preferred_codes: vec![
                "stamps_com".to_string(),
                "ups".to_string(),
                "fedex".to_string(),
            ],
            preferred_services: vec!["ground".to_string(), "advantage".to_string()],
            avoid: Vec::new(),
            international_codes: vec!["ups".to_string(), "fedex".to_string()],
            expedited_codes: vec!["ups".to_string(), "fedex".to_string()],
            high_value_codes: vec!["ups".to_string(), "fedex".to_string()],
            high_value_threshold: Decimal::new(50000, 2),
            domestic_country: "US".to_string(),
        }
    }
}

mod ttl_seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A selection with its derived package and service codes.
#[derive(Debug, Clone)]
pub struct CarrierChoice {
    /// Selected carrier.
    pub carrier_id: CarrierId,
    /// Selected carrier's code; the fallback code when the list was
    /// unavailable.
    pub carrier_code: String,
    /// Ounce-banded package code for the carrier family.
    pub package_code: String,
    /// Derived service code.
    pub service_code: String,
}

struct CachedList {
    fetched_at: DateTime<Utc>,
    carriers: Vec<Carrier>,
}

/// Preference-driven carrier selector with a TTL-bounded carrier cache.
pub struct CarrierSelector<S> {
    platform: Arc<S>,
    clock: Arc<dyn Clock>,
    config: SelectorConfig,
    cache: RwLock<Option<CachedList>>,
    // Held across the refresh fetch so concurrent misses collapse into
    // one upstream call.
    refresh: Mutex<()>,
}

impl<S: ShippingPlatform> CarrierSelector<S> {
    /// Creates a selector over the given platform.
    pub fn new(platform: Arc<S>, clock: Arc<dyn Clock>, config: SelectorConfig) -> Self {
        Self { platform, clock, config, cache: RwLock::new(None), refresh: Mutex::new(()) }
    }

    /// Selects a carrier for a normalized request and derives its package
    /// and service codes.
    pub async fn select(&self, request: &NormalizedShipmentRequest) -> CarrierChoice {
        let carriers = self.active_carriers().await;
        let selected = self.pick(&carriers, request);

        let (carrier_id, carrier_code) = match selected {
            Some(carrier) => (carrier.id.clone(), carrier.code.clone()),
            None => {
                warn!(
                    fallback = %self.config.fallback_carrier,
                    "carrier list empty or unusable, using fallback carrier"
                );
                (self.config.fallback_carrier.clone(), self.config.fallback_carrier.to_string())
            }
        };

        let package_code = derive_package(&carrier_code, request.weight_oz);
        let service_code = derive_service(
            &carrier_code,
            request.carrier_preference.service_level.as_deref(),
            &package_code,
        );
        CarrierChoice { carrier_id, carrier_code, package_code, service_code }
    }

    fn pick<'a>(
        &self,
        carriers: &'a [Carrier],
        request: &NormalizedShipmentRequest,
    ) -> Option<&'a Carrier> {
        let active: Vec<&Carrier> = carriers.iter().filter(|c| c.active).collect();
        if active.is_empty() {
            return None;
        }
        let preference = &request.carrier_preference;

        // Required carrier short-circuit.
        if preference.is_required {
            if let Some(wanted) = preference.carrier.as_deref() {
                let found = active.iter().find(|c| {
                    carrier_matches(c, wanted)
                        && preference
                            .service_level
                            .as_deref()
                            .map_or(true, |s| family_offers_service(&c.code, s))
                });
                if let Some(carrier) = found {
                    debug!(carrier = %carrier.code, "required carrier honored");
                    return Some(carrier);
                }
                warn!(wanted, "required carrier unavailable, falling back to scoring");
            }
        }

        let codes = self.effective_codes(request);
        let mut best: Option<(&Carrier, i64)> = None;
        for carrier in &active {
            let score = self.score(carrier, &codes, preference);
            debug!(carrier = %carrier.code, score, "carrier scored");
            // Strict comparison keeps ties on the earlier list entry.
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((carrier, score));
            }
        }
        best.map(|(c, _)| c)
    }

    /// Preferred-code list adjusted for destination, speed hints and order
    /// value. Promotions prepend without duplicating.
    fn effective_codes(&self, request: &NormalizedShipmentRequest) -> Vec<String> {
        let mut codes = self.config.preferred_codes.clone();
        let preference = &request.carrier_preference;

        if request.amount_paid >= self.config.high_value_threshold && !preference.is_required {
            promote(&mut codes, &self.config.high_value_codes);
        }
        if preference
            .service_level
            .as_deref()
            .is_some_and(|s| EXPEDITED_KEYWORDS.iter().any(|k| s.contains(k)))
        {
            promote(&mut codes, &self.config.expedited_codes);
        }
        if !request.ship_to.country.eq_ignore_ascii_case(&self.config.domestic_country) {
            promote(&mut codes, &self.config.international_codes);
        }
        codes
    }

    fn score(&self, carrier: &Carrier, codes: &[String], preference: &CarrierPreference) -> i64 {
        let mut score = 0i64;
        for (rank, code) in codes.iter().enumerate() {
            if carrier_matches(carrier, code) {
                score += 10 * (codes.len() - rank) as i64;
            }
        }
        for (rank, service) in self.config.preferred_services.iter().enumerate() {
            if family_offers_service(&carrier.code, service) {
                score += 5 * (self.config.preferred_services.len() - rank) as i64;
            }
        }
        if let Some(requested) = preference.service_level.as_deref() {
            if requested.contains("ground") && family_offers_service(&carrier.code, "ground") {
                score += 8;
            }
            if requested.contains("advantage") && family_offers_service(&carrier.code, "advantage")
            {
                score += 8;
            }
        }
        if let Some(wanted) = preference.carrier.as_deref() {
            if carrier_matches(carrier, wanted) {
                score += 25;
            }
        }
        if self.config.avoid.iter().any(|a| carrier_matches(carrier, a)) {
            score -= 100;
        }
        score
    }

    /// Active carriers from the cache, refreshing when stale. A refresh
    /// failure degrades to the stale list when one exists, otherwise to
    /// empty (and the fallback carrier downstream).
    async fn active_carriers(&self) -> Vec<Carrier> {
        let now = self.clock.now();
        if let Some(cached) = self.cache.read().await.as_ref() {
            if fresh(cached, now, self.config.cache_ttl) {
                return cached.carriers.clone();
            }
        }

        let _refreshing = self.refresh.lock().await;
        // Another task may have refreshed while this one waited.
        if let Some(cached) = self.cache.read().await.as_ref() {
            if fresh(cached, now, self.config.cache_ttl) {
                return cached.carriers.clone();
            }
        }

        match self.platform.carriers().await {
            Ok(carriers) => {
                debug!(count = carriers.len(), "carrier cache refreshed");
                let list = carriers.clone();
                *self.cache.write().await = Some(CachedList { fetched_at: now, carriers });
                list
            }
            Err(error) => {
                warn!(%error, "carrier list fetch failed");
                self.cache.read().await.as_ref().map(|c| c.carriers.clone()).unwrap_or_default()
            }
        }
    }
}

fn fresh(cached: &CachedList, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(cached.fetched_at).num_seconds() < ttl.as_secs() as i64
}

fn promote(codes: &mut Vec<String>, front: &[String]) {
    for code in front.iter().rev() {
        codes.retain(|c| c != code);
        codes.insert(0, code.clone());
    }
}

fn carrier_matches(carrier: &Carrier, wanted: &str) -> bool {
    let wanted = wanted.to_lowercase();
    carrier.code.to_lowercase().contains(&wanted)
        || carrier.name.to_lowercase().contains(&wanted)
        || wanted.contains(&carrier.code.to_lowercase())
}

/// Whether a carrier family is known to offer a service matching the
/// given name fragment.
fn family_offers_service(code: &str, service: &str) -> bool {
    let service = service.to_lowercase();
    match family(code) {
        Family::Usps => {
            ["ground", "advantage", "priority", "first class", "express"]
                .iter()
                .any(|s| service.contains(s))
        }
        Family::Ups => ["ground", "air", "2nd day", "next day", "express", "saver"]
            .iter()
            .any(|s| service.contains(s)),
        Family::Fedex => ["ground", "2day", "express", "overnight", "home"]
            .iter()
            .any(|s| service.contains(s)),
        Family::Other => false,
    }
}

enum Family {
    Usps,
    Ups,
    Fedex,
    Other,
}

fn family(code: &str) -> Family {
    let code = code.to_lowercase();
    if code.contains("stamps") || code.contains("usps") {
        Family::Usps
    } else if code.contains("ups") {
        Family::Ups
    } else if code.contains("fedex") {
        Family::Fedex
    } else {
        Family::Other
    }
}

const OZ_PER_LB: u32 = 16;

/// Ounce-banded package code for a carrier family.
pub fn derive_package(carrier_code: &str, weight_oz: u32) -> String {
    match family(carrier_code) {
        Family::Usps => {
            if weight_oz <= 13 {
                "large_envelope_or_flat".to_string()
            } else if weight_oz <= 70 * OZ_PER_LB {
                "package".to_string()
            } else {
                "medium_flat_rate_box".to_string()
            }
        }
        Family::Ups | Family::Fedex | Family::Other => {
            if weight_oz > 150 * OZ_PER_LB {
                "large_package".to_string()
            } else {
                "package".to_string()
            }
        }
    }
}

/// Service code from requested-service keywords and the package type. A
/// flat-rate package forces the matching priority service regardless of
/// the keyword match.
pub fn derive_service(carrier_code: &str, requested: Option<&str>, package_code: &str) -> String {
    let requested = requested.unwrap_or("").to_lowercase();
    let expedited = EXPEDITED_KEYWORDS.iter().any(|k| requested.contains(k));
    match family(carrier_code) {
        Family::Usps => {
            if package_code.contains("flat_rate_box") {
                "usps_priority_mail".to_string()
            } else if requested.contains("express") || requested.contains("overnight") {
                "usps_priority_mail_express".to_string()
            } else if requested.contains("priority") {
                "usps_priority_mail".to_string()
            } else if package_code == "large_envelope_or_flat" {
                "usps_first_class_mail".to_string()
            } else {
                "usps_ground_advantage".to_string()
            }
        }
        Family::Ups => {
            if requested.contains("next day") || requested.contains("overnight") {
                "ups_next_day_air".to_string()
            } else if requested.contains("2") {
                "ups_2nd_day_air".to_string()
            } else {
                "ups_ground".to_string()
            }
        }
        Family::Fedex => {
            if requested.contains("overnight") || requested.contains("next day") {
                "fedex_standard_overnight".to_string()
            } else if requested.contains("2") {
                "fedex_2day".to_string()
            } else {
                "fedex_ground".to_string()
            }
        }
        Family::Other => {
            if expedited {
                format!("{}_expedited", carrier_code.to_lowercase())
            } else {
                format!("{}_ground", carrier_code.to_lowercase())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use lading_core::models::{ResidentialIndicator, ShipmentAddress};
    use lading_core::time::TestClock;
    use lading_testing::FakeShippingPlatform;

    use super::*;

    fn request(preference: CarrierPreference, country: &str, amount: Decimal) -> NormalizedShipmentRequest {
        NormalizedShipmentRequest {
            external_id: "R1".to_string(),
            display_number: "PO1".to_string(),
            order_date: Utc::now(),
            currency_code: "USD".to_string(),
            amount_paid: amount,
            ship_to: ShipmentAddress {
                name: "Pat Doe".to_string(),
                line1: "1 Main St".to_string(),
                line2: None,
                city: "Austin".to_string(),
                state: "TX".to_string(),
                postal_code: "78701".to_string(),
                country: country.to_string(),
                phone: "000-000-0000".to_string(),
                residential: ResidentialIndicator::Unknown,
            },
            items: Vec::new(),
            weight_oz: 32,
            package_code: None,
            service_code: None,
            carrier_preference: preference,
        }
    }

    fn selector_with(
        carriers: Vec<Carrier>,
    ) -> (CarrierSelector<FakeShippingPlatform>, Arc<FakeShippingPlatform>, Arc<TestClock>) {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.set_carriers(carriers);
        let clock = Arc::new(TestClock::default());
        let selector =
            CarrierSelector::new(platform.clone(), clock.clone(), SelectorConfig::default());
        (selector, platform, clock)
    }

    fn carrier(id: &str, code: &str, name: &str, active: bool) -> Carrier {
        Carrier { id: CarrierId::new(id), code: code.to_string(), name: name.to_string(), active }
    }

    #[tokio::test]
    async fn required_active_carrier_short_circuits() {
        let (selector, _, _) = selector_with(vec![
            carrier("c1", "stamps_com", "USPS", true),
            carrier("c2", "ups", "UPS", true),
        ]);
        let preference = CarrierPreference {
            carrier: Some("ups".to_string()),
            service_level: Some("ground".to_string()),
            is_required: true,
        };
        let choice = selector.select(&request(preference, "US", Decimal::new(1000, 2))).await;
        assert_eq!(choice.carrier_id, CarrierId::new("c2"));
        assert_eq!(choice.service_code, "ups_ground");
        assert_eq!(choice.package_code, "package");
    }

    #[tokio::test]
    async fn required_but_inactive_falls_back_to_scoring() {
        let (selector, _, _) = selector_with(vec![
            carrier("c1", "stamps_com", "USPS", true),
            carrier("c2", "ups", "UPS", false),
        ]);
        let preference = CarrierPreference {
            carrier: Some("ups".to_string()),
            service_level: None,
            is_required: true,
        };
        let choice = selector.select(&request(preference, "US", Decimal::new(1000, 2))).await;
        assert_eq!(choice.carrier_id, CarrierId::new("c1"));
    }

    #[tokio::test]
    async fn empty_carrier_list_uses_fallback() {
        let (selector, _, _) = selector_with(Vec::new());
        let choice =
            selector.select(&request(CarrierPreference::default(), "US", Decimal::ONE)).await;
        assert_eq!(choice.carrier_id, CarrierId::new("stamps_com"));
        assert!(!choice.service_code.is_empty());
        assert!(!choice.package_code.is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_uses_fallback() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.fail_carriers(lading_core::error::SyncError::transient("downstream", "down"));
        let selector = CarrierSelector::new(
            platform,
            Arc::new(TestClock::default()),
            SelectorConfig::default(),
        );
        let choice =
            selector.select(&request(CarrierPreference::default(), "US", Decimal::ONE)).await;
        assert_eq!(choice.carrier_id, CarrierId::new("stamps_com"));
    }

    #[tokio::test]
    async fn international_destination_promotes_international_codes() {
        let (selector, _, _) = selector_with(vec![
            carrier("c1", "stamps_com", "USPS", true),
            carrier("c2", "ups", "UPS", true),
        ]);
        let choice =
            selector.select(&request(CarrierPreference::default(), "CA", Decimal::ONE)).await;
        assert_eq!(choice.carrier_id, CarrierId::new("c2"));
    }

    #[tokio::test]
    async fn high_value_bias_skipped_when_required() {
        let (selector, _, _) = selector_with(vec![
            carrier("c1", "stamps_com", "USPS", true),
            carrier("c2", "ups", "UPS", true),
        ]);
        let preference = CarrierPreference {
            carrier: Some("usps".to_string()),
            service_level: None,
            is_required: true,
        };
        let choice = selector.select(&request(preference, "US", Decimal::new(100_000, 2))).await;
        assert_eq!(choice.carrier_id, CarrierId::new("c1"));
    }

    #[tokio::test]
    async fn avoided_carrier_loses() {
        let platform = Arc::new(FakeShippingPlatform::new());
        platform.set_carriers(vec![
            carrier("c1", "stamps_com", "USPS", true),
            carrier("c2", "ups", "UPS", true),
        ]);
        let config = SelectorConfig {
            avoid: vec!["stamps_com".to_string()],
            ..SelectorConfig::default()
        };
        let selector = CarrierSelector::new(platform, Arc::new(TestClock::default()), config);
        let choice =
            selector.select(&request(CarrierPreference::default(), "US", Decimal::ONE)).await;
        assert_eq!(choice.carrier_id, CarrierId::new("c2"));
    }

    #[tokio::test]
    async fn cache_serves_within_ttl_and_refreshes_after() {
        let (selector, platform, clock) =
            selector_with(vec![carrier("c1", "stamps_com", "USPS", true)]);
        let req = request(CarrierPreference::default(), "US", Decimal::ONE);
        selector.select(&req).await;
        selector.select(&req).await;
        assert_eq!(platform.carriers_calls(), 1);

        clock.advance(Duration::from_secs(301));
        selector.select(&req).await;
        assert_eq!(platform.carriers_calls(), 2);
    }

    #[test]
    fn usps_light_parcel_gets_flat_band() {
        assert_eq!(derive_package("stamps_com", 8), "large_envelope_or_flat");
        assert_eq!(derive_service("stamps_com", None, "large_envelope_or_flat"), "usps_first_class_mail");
    }

    #[test]
    fn flat_rate_package_forces_priority() {
        let package = derive_package("stamps_com", 71 * 16);
        assert_eq!(package, "medium_flat_rate_box");
        assert_eq!(derive_service("stamps_com", Some("ground"), &package), "usps_priority_mail");
    }

    #[test]
    fn expedited_keyword_picks_fast_service() {
        assert_eq!(derive_service("ups", Some("2nd day"), "package"), "ups_2nd_day_air");
        assert_eq!(derive_service("fedex", Some("overnight"), "package"), "fedex_standard_overnight");
    }
}
