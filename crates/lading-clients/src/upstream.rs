//! HTTP client for the source order-management platform.
//!
//! Covers the three upstream operations: the event feed, order bodies,
//! and the tracking write-back. A 404 means different things per
//! endpoint: on the feed it is a rotated/deleted stream (terminal), on an
//! order it is an order deleted before fetch (skip and report).

use async_trait::async_trait;
use tracing::debug;

use lading_core::{
    error::{Result, SyncError},
    models::{EventPage, SourceOrder, StreamId, TrackingUpdate},
    platform::OrderPlatform,
};

use crate::{
    http::{self, ClientConfig},
    retry::with_retry,
};

const TARGET: &str = "upstream";

/// Order-management platform client.
#[derive(Debug, Clone)]
pub struct OrderPlatformClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl OrderPlatformClient {
    /// Creates a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = http::build_client(&config, TARGET)?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

#[async_trait]
impl OrderPlatform for OrderPlatformClient {
    async fn events_since(
        &self,
        stream_id: &StreamId,
        position: Option<u64>,
    ) -> Result<EventPage> {
        with_retry(&self.config.retry, "events_since", || async {
            let mut request = self
                .client
                .get(self.url(&format!("/streams/{stream_id}/events")))
                .header("x-api-key", &self.config.api_key);
            if let Some(position) = position {
                request = request.query(&[("after", position)]);
            }

            let response =
                request.send().await.map_err(|e| http::transport_error(TARGET, &e))?;

            if response.status().as_u16() == 404 {
                return Err(SyncError::StreamNotFound { stream_id: stream_id.to_string() });
            }
            if !response.status().is_success() {
                return Err(http::status_error(TARGET, &response));
            }

            let page: EventPage = response
                .json()
                .await
                .map_err(|e| SyncError::transient(TARGET, format!("invalid event page: {e}")))?;
            debug!(stream = %stream_id, events = page.events.len(), "fetched event page");
            Ok(page)
        })
        .await
    }

    async fn fetch_order(&self, order_id: &str) -> Result<SourceOrder> {
        with_retry(&self.config.retry, "fetch_order", || async {
            let response = self
                .client
                .get(self.url(&format!("/orders/{order_id}")))
                .header("x-api-key", &self.config.api_key)
                .send()
                .await
                .map_err(|e| http::transport_error(TARGET, &e))?;

            if response.status().as_u16() == 404 {
                return Err(SyncError::OrderNotFound { order_id: order_id.to_string() });
            }
            if !response.status().is_success() {
                return Err(http::status_error(TARGET, &response));
            }

            response
                .json()
                .await
                .map_err(|e| SyncError::transient(TARGET, format!("invalid order body: {e}")))
        })
        .await
    }

    async fn push_tracking(&self, order_id: &str, update: &TrackingUpdate) -> Result<()> {
        with_retry(&self.config.retry, "push_tracking", || async {
            let response = self
                .client
                .put(self.url(&format!("/orders/{order_id}/tracking")))
                .header("x-api-key", &self.config.api_key)
                .json(update)
                .send()
                .await
                .map_err(|e| http::transport_error(TARGET, &e))?;

            if response.status().as_u16() == 404 {
                return Err(SyncError::OrderNotFound { order_id: order_id.to_string() });
            }
            if !response.status().is_success() {
                return Err(http::status_error(TARGET, &response));
            }
            debug!(order_id, tracking = %update.tracking_number, "pushed tracking update");
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> OrderPlatformClient {
        let mut config = ClientConfig::new(server.uri(), "test-key");
        config.retry.base_delay = std::time::Duration::from_millis(1);
        config.retry.jitter_factor = 0.0;
        OrderPlatformClient::new(config).unwrap()
    }

    #[tokio::test]
    async fn fetches_event_page_after_position() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/streams/orders/events"))
            .and(matchers::query_param("after", "41"))
            .and(matchers::header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "events": [{
                    "id": 42,
                    "objectId": "R1",
                    "objectType": "order",
                    "eventReason": "create",
                    "timestamp": "2024-06-01T12:00:00Z"
                }],
                "nextPosition": 42
            })))
            .mount(&server)
            .await;

        let page =
            client_for(&server).events_since(&StreamId::from("orders"), Some(41)).await.unwrap();
        assert_eq!(page.events.len(), 1);
        assert_eq!(page.events[0].id, 42);
        assert_eq!(page.next_position, Some(42));
    }

    #[tokio::test]
    async fn rotated_stream_is_terminal_not_retried() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/streams/gone/events"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err =
            client_for(&server).events_since(&StreamId::from("gone"), None).await.unwrap_err();
        assert!(matches!(err, SyncError::StreamNotFound { .. }));
        server.verify().await;
    }

    #[tokio::test]
    async fn order_fetch_retries_transient_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/orders/R1"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/orders/R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "orderId": "R1",
                "poNumber": "PO1",
                "lifecycle": "acknowledged"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client_for(&server).fetch_order("R1").await.unwrap();
        assert_eq!(order.order_id.as_deref(), Some("R1"));
        server.verify().await;
    }

    #[tokio::test]
    async fn deleted_order_maps_to_order_not_found() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/orders/GONE"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).fetch_order("GONE").await.unwrap_err();
        assert!(matches!(err, SyncError::OrderNotFound { .. }));
    }

    #[tokio::test]
    async fn tracking_push_sends_payload() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("PUT"))
            .and(matchers::path("/orders/R1/tracking"))
            .and(matchers::body_partial_json(serde_json::json!({
                "trackingNumber": "1Z999",
                "carrierCode": "ups"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let update = TrackingUpdate {
            tracking_number: "1Z999".to_string(),
            carrier_code: Some("ups".to_string()),
            ship_date: None,
        };
        client_for(&server).push_tracking("R1", &update).await.unwrap();
        server.verify().await;
    }
}
