use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use lading_core::{
    error::{Result, SyncError},
    models::{Carrier, DownstreamShipment, ShipmentCreate, ShipmentLabel},
    platform::ShippingPlatform,
};

/// Scriptable in-memory shipping platform.
///
/// Seeded shipments are indexed (visible to the external-id and
/// display-number lookups) unless seeded via
/// [`FakeShippingPlatform::seed_unindexed_shipment`], which models a
/// platform whose indexes lag creation: such shipments only show up in
/// the recent window.
#[derive(Debug, Default)]
pub struct FakeShippingPlatform {
    carriers: Mutex<Vec<Carrier>>,
    carriers_failure: Mutex<Option<SyncError>>,
    carriers_calls: AtomicUsize,
    indexed: Mutex<Vec<DownstreamShipment>>,
    unindexed: Mutex<Vec<DownstreamShipment>>,
    links: Mutex<HashMap<String, String>>,
    labels: Mutex<HashMap<String, Vec<ShipmentLabel>>>,
    lookup_failure: Mutex<Option<SyncError>>,
    tag_failure: Mutex<Option<SyncError>>,
    create_failures: Mutex<HashMap<String, SyncError>>,
    created: AtomicUsize,
}

impl FakeShippingPlatform {
    /// Creates an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the carrier list.
    pub fn set_carriers(&self, carriers: Vec<Carrier>) {
        *self.carriers.lock().unwrap() = carriers;
    }

    /// Makes the carrier list fetch fail.
    pub fn fail_carriers(&self, error: SyncError) {
        *self.carriers_failure.lock().unwrap() = Some(error);
    }

    /// How many times the carrier list has been fetched.
    pub fn carriers_calls(&self) -> usize {
        self.carriers_calls.load(Ordering::SeqCst)
    }

    /// Seeds a fully indexed shipment.
    pub fn seed_shipment(&self, shipment: DownstreamShipment) {
        self.indexed.lock().unwrap().push(shipment);
    }

    /// Seeds a shipment visible only in the recent window.
    pub fn seed_unindexed_shipment(&self, shipment: DownstreamShipment) {
        self.unindexed.lock().unwrap().push(shipment);
    }

    /// Makes the lookup endpoints fail.
    pub fn fail_lookup(&self, error: SyncError) {
        *self.lookup_failure.lock().unwrap() = Some(error);
    }

    /// Makes tag writes fail.
    pub fn fail_tag_writes(&self, error: SyncError) {
        *self.tag_failure.lock().unwrap() = Some(error);
    }

    /// Makes creation fail for one external id.
    pub fn fail_create_for(&self, external_id: &str, error: SyncError) {
        self.create_failures.lock().unwrap().insert(external_id.to_string(), error);
    }

    /// How many shipments have been created.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Records the linked-order reference for a shipment.
    pub fn link_order(&self, shipment_id: &str, order_reference: &str) {
        self.links.lock().unwrap().insert(shipment_id.to_string(), order_reference.to_string());
    }

    /// Adds a purchased label to a shipment.
    pub fn add_label(&self, shipment_id: &str, label: ShipmentLabel) {
        self.labels.lock().unwrap().entry(shipment_id.to_string()).or_default().push(label);
    }

    fn lookup_guard(&self) -> Result<()> {
        match self.lookup_failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn all_shipments(&self) -> Vec<DownstreamShipment> {
        let mut all = self.unindexed.lock().unwrap().clone();
        all.extend(self.indexed.lock().unwrap().iter().cloned());
        all
    }
}

#[async_trait]
impl ShippingPlatform for FakeShippingPlatform {
    async fn carriers(&self) -> Result<Vec<Carrier>> {
        self.carriers_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.carriers_failure.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(self.carriers.lock().unwrap().clone())
    }

    async fn create_shipment(&self, create: &ShipmentCreate) -> Result<DownstreamShipment> {
        if let Some(error) =
            self.create_failures.lock().unwrap().get(&create.request.external_id)
        {
            return Err(error.clone());
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        let shipment = DownstreamShipment {
            shipment_id: format!("shp-{n}"),
            external_id: Some(create.request.external_id.clone()),
            display_number: Some(create.request.display_number.clone()),
            status: Some("awaiting_shipment".to_string()),
            carrier_code: Some(create.carrier_id.to_string()),
            service_code: create.request.service_code.clone(),
            package_code: create.request.package_code.clone(),
            weight_oz: Some(create.request.weight_oz),
            tracking_number: None,
            ship_date: None,
            tags: create.tags.clone(),
        };
        self.indexed.lock().unwrap().push(shipment.clone());
        Ok(shipment)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<DownstreamShipment>> {
        self.lookup_guard()?;
        Ok(self
            .indexed
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn search_by_display_number(
        &self,
        display_number: &str,
    ) -> Result<Vec<DownstreamShipment>> {
        self.lookup_guard()?;
        // Substring match, like the real platform's fuzzy search.
        Ok(self
            .indexed
            .lock()
            .unwrap()
            .iter()
            .filter(|s| {
                s.display_number.as_deref().map_or(false, |d| d.contains(display_number))
            })
            .cloned()
            .collect())
    }

    async fn recent_shipments(&self, limit: usize) -> Result<Vec<DownstreamShipment>> {
        self.lookup_guard()?;
        let mut all = self.all_shipments();
        all.reverse();
        all.truncate(limit);
        Ok(all)
    }

    async fn get_shipment(&self, shipment_id: &str) -> Result<DownstreamShipment> {
        self.all_shipments()
            .into_iter()
            .find(|s| s.shipment_id == shipment_id)
            .ok_or_else(|| {
                SyncError::permanent("downstream", 404, format!("no shipment {shipment_id}"))
            })
    }

    async fn linked_order_reference(&self, shipment_id: &str) -> Result<Option<String>> {
        Ok(self.links.lock().unwrap().get(shipment_id).cloned())
    }

    async fn shipment_labels(&self, shipment_id: &str) -> Result<Vec<ShipmentLabel>> {
        Ok(self.labels.lock().unwrap().get(shipment_id).cloned().unwrap_or_default())
    }

    async fn write_order_tag(&self, shipment_id: &str, order_id: &str) -> Result<()> {
        if let Some(error) = self.tag_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let tag = lading_core::models::order_tag(order_id);
        for shipment in self.indexed.lock().unwrap().iter_mut() {
            if shipment.shipment_id == shipment_id && !shipment.tags.contains(&tag) {
                shipment.tags.push(tag.clone());
            }
        }
        Ok(())
    }
}
