use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::Utc;

use lading_core::{
    error::{Result, SyncError},
    models::{EventPage, EventReason, SourceOrder, StreamEvent, StreamId, TrackingUpdate},
    platform::OrderPlatform,
};

/// Scriptable in-memory order platform.
#[derive(Debug, Default)]
pub struct FakeOrderPlatform {
    events: Mutex<Vec<StreamEvent>>,
    orders: Mutex<HashMap<String, SourceOrder>>,
    order_failures: Mutex<HashMap<String, SyncError>>,
    stream_failure: Mutex<Option<SyncError>>,
    tracking_pushes: Arc<AtomicUsize>,
}

impl FakeOrderPlatform {
    /// Creates an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event to the feed.
    pub fn push_event(&self, id: u64, object_id: &str, object_type: &str, reason: EventReason) {
        self.events.lock().unwrap().push(StreamEvent {
            id,
            object_id: object_id.to_string(),
            object_type: object_type.to_string(),
            event_reason: reason,
            timestamp: Utc::now(),
        });
    }

    /// Stores an order body.
    pub fn put_order(&self, order_id: &str, order: SourceOrder) {
        self.orders.lock().unwrap().insert(order_id.to_string(), order);
    }

    /// Makes every fetch of `order_id` fail with the given error.
    pub fn fail_order_fetch(&self, order_id: &str, error: SyncError) {
        self.order_failures.lock().unwrap().insert(order_id.to_string(), error);
    }

    /// Makes the event feed fail with the given error.
    pub fn fail_stream(&self, error: SyncError) {
        *self.stream_failure.lock().unwrap() = Some(error);
    }

    /// Counter of tracking pushes received, shared so tests can hold it
    /// after handing the platform to the code under test.
    pub fn tracking_pushes(&self) -> Arc<AtomicUsize> {
        self.tracking_pushes.clone()
    }
}

#[async_trait]
impl OrderPlatform for FakeOrderPlatform {
    async fn events_since(
        &self,
        _stream_id: &StreamId,
        position: Option<u64>,
    ) -> Result<EventPage> {
        if let Some(error) = self.stream_failure.lock().unwrap().clone() {
            return Err(error);
        }
        let events: Vec<StreamEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| position.map_or(true, |p| e.id > p))
            .cloned()
            .collect();
        let next_position = events.iter().map(|e| e.id).max();
        Ok(EventPage { events, next_position })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<SourceOrder> {
        if let Some(error) = self.order_failures.lock().unwrap().get(order_id) {
            return Err(error.clone());
        }
        self.orders
            .lock()
            .unwrap()
            .get(order_id)
            .cloned()
            .ok_or_else(|| SyncError::OrderNotFound { order_id: order_id.to_string() })
    }

    async fn push_tracking(&self, order_id: &str, update: &TrackingUpdate) -> Result<()> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| SyncError::OrderNotFound { order_id: order_id.to_string() })?;
        order.tracking_numbers.push(update.tracking_number.clone());
        self.tracking_pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
