//! HTTP client for the downstream shipping platform.
//!
//! One wrapper per platform endpoint the pipeline needs: carriers,
//! shipment create, the three duplicate-lookup queries, shipment reads,
//! labels, the linked-order custom field, and tag writes.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use lading_core::{
    error::{Result, SyncError},
    models::{order_tag, Carrier, DownstreamShipment, ShipmentCreate, ShipmentLabel},
    platform::ShippingPlatform,
};

use crate::{
    http::{self, ClientConfig},
    retry::with_retry,
};

const TARGET: &str = "downstream";

/// Shipping platform client.
#[derive(Debug, Clone)]
pub struct ShippingPlatformClient {
    client: reqwest::Client,
    config: ClientConfig,
}

#[derive(Debug, Deserialize)]
struct ShipmentList {
    shipments: Vec<DownstreamShipment>,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    labels: Vec<ShipmentLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkedOrder {
    order_reference: Option<String>,
}

impl ShippingPlatformClient {
    /// Creates a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = http::build_client(&config, TARGET)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str, op: &str) -> Result<T> {
        with_retry(&self.config.retry, op, || async {
            let response = self
                .client
                .get(self.url(path))
                .header("x-api-key", &self.config.api_key)
                .send()
                .await
                .map_err(|e| http::transport_error(TARGET, &e))?;

            if !response.status().is_success() {
                return Err(http::status_error(TARGET, &response));
            }
            response
                .json()
                .await
                .map_err(|e| SyncError::transient(TARGET, format!("invalid {op} body: {e}")))
        })
        .await
    }

    async fn list_shipments(&self, path: &str, op: &str) -> Result<Vec<DownstreamShipment>> {
        let list: ShipmentList = self.get_json(path, op).await?;
        Ok(list.shipments)
    }
}

#[async_trait]
impl ShippingPlatform for ShippingPlatformClient {
    async fn carriers(&self) -> Result<Vec<Carrier>> {
        self.get_json("/carriers", "carriers").await
    }

    async fn create_shipment(&self, create: &ShipmentCreate) -> Result<DownstreamShipment> {
        // No retry wrapper here. A create that times out after the
        // platform accepted it would double-ship on retry; the pipeline
        // resolves that through the duplicate lookups on the next event.
        let response = self
            .client
            .post(self.url("/shipments"))
            .query(&[("create_sales_order", "true")])
            .header("x-api-key", &self.config.api_key)
            .json(create)
            .send()
            .await
            .map_err(|e| http::transport_error(TARGET, &e))?;

        if !response.status().is_success() {
            return Err(http::status_error(TARGET, &response));
        }
        let shipment: DownstreamShipment = response
            .json()
            .await
            .map_err(|e| SyncError::transient(TARGET, format!("invalid shipment body: {e}")))?;
        debug!(
            shipment_id = %shipment.shipment_id,
            external_id = %create.request.external_id,
            "created shipment"
        );
        Ok(shipment)
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<DownstreamShipment>> {
        let path = format!("/shipments?externalId={}", urlencode(external_id));
        let mut shipments = self.list_shipments(&path, "find_by_external_id").await?;
        let first = shipments.drain(..).next();
        Ok(first)
    }

    async fn search_by_display_number(
        &self,
        display_number: &str,
    ) -> Result<Vec<DownstreamShipment>> {
        let path = format!("/shipments?displayNumber={}", urlencode(display_number));
        self.list_shipments(&path, "search_by_display_number").await
    }

    async fn recent_shipments(&self, limit: usize) -> Result<Vec<DownstreamShipment>> {
        let path = format!("/shipments?limit={limit}&sort=createdAt&order=desc");
        self.list_shipments(&path, "recent_shipments").await
    }

    async fn get_shipment(&self, shipment_id: &str) -> Result<DownstreamShipment> {
        self.get_json(&format!("/shipments/{shipment_id}"), "get_shipment").await
    }

    async fn linked_order_reference(&self, shipment_id: &str) -> Result<Option<String>> {
        let linked: LinkedOrder =
            self.get_json(&format!("/shipments/{shipment_id}/order"), "linked_order").await?;
        Ok(linked.order_reference.filter(|r| !r.is_empty()))
    }

    async fn shipment_labels(&self, shipment_id: &str) -> Result<Vec<ShipmentLabel>> {
        let list: LabelList =
            self.get_json(&format!("/shipments/{shipment_id}/labels"), "labels").await?;
        Ok(list.labels)
    }

    async fn write_order_tag(&self, shipment_id: &str, order_id: &str) -> Result<()> {
        with_retry(&self.config.retry, "write_order_tag", || async {
            let response = self
                .client
                .post(self.url(&format!("/shipments/{shipment_id}/tags")))
                .header("x-api-key", &self.config.api_key)
                .json(&serde_json::json!({ "tag": order_tag(order_id) }))
                .send()
                .await
                .map_err(|e| http::transport_error(TARGET, &e))?;

            if !response.status().is_success() {
                return Err(http::status_error(TARGET, &response));
            }
            Ok(())
        })
        .await
    }
}

/// Minimal percent-encoding for query values (identifiers and PO numbers,
/// so only the reserved subset that actually occurs needs escaping).
fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
