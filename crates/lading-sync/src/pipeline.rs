//! One polling cycle end to end: fetch, map, select, create, commit.
//!
//! The pipeline owns the overlap guard. A cycle in flight causes new
//! triggers to be discarded, per pipeline instance so several streams
//! can run in one process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use lading_core::{
    checkpoint::CheckpointStore,
    error::Result,
    models::{order_tag, ShipmentCreate, StreamId},
    platform::{OrderPlatform, ShippingPlatform},
    time::Clock,
};
use lading_mapper::{MapperConfig, WeightCatalog};

use crate::{
    carrier::CarrierSelector,
    consumer::{ConsumerConfig, EventStreamConsumer},
    dedupe::{CreateOutcome, IdempotentCreator},
};

/// Structured summary of one cycle, emitted regardless of partial
/// failures so operators never need raw logs to see what happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Events that survived filtering.
    pub events: usize,
    /// Order bodies fetched.
    pub fetched: usize,
    /// Orders that mapped to a valid request.
    pub mapped: usize,
    /// Shipments created downstream.
    pub created: usize,
    /// Orders already present downstream.
    pub duplicates: usize,
    /// Orders skipped by the processing gate or deleted upstream.
    pub skipped: usize,
    /// Orders that failed fetch, validation or creation this cycle.
    pub failed: usize,
    /// Checkpoint position after the cycle, when it moved.
    pub committed_position: Option<u64>,
}

/// Why `run_cycle` did not produce a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSkipped {
    /// A previous cycle is still in flight.
    Overlap,
}

/// The order-to-shipment pipeline for one stream.
pub struct SyncPipeline<U, D, C> {
    consumer: EventStreamConsumer<U, C>,
    selector: CarrierSelector<D>,
    creator: IdempotentCreator<D>,
    mapper_config: MapperConfig,
    catalog: Arc<dyn WeightCatalog>,
    clock: Arc<dyn Clock>,
    stream_id: StreamId,
    running: AtomicBool,
}

impl<U, D, C> SyncPipeline<U, D, C>
where
    U: OrderPlatform,
    D: ShippingPlatform,
    C: CheckpointStore,
{
    /// Wires a pipeline over the two platforms and a checkpoint store.
    pub fn new(
        upstream: Arc<U>,
        downstream: Arc<D>,
        store: Arc<C>,
        clock: Arc<dyn Clock>,
        consumer_config: ConsumerConfig,
        selector_config: crate::carrier::SelectorConfig,
        mapper_config: MapperConfig,
        catalog: Arc<dyn WeightCatalog>,
    ) -> Self {
        let stream_id = consumer_config.stream_id.clone();
        Self {
            consumer: EventStreamConsumer::new(upstream, store, clock.clone(), consumer_config),
            selector: CarrierSelector::new(downstream.clone(), clock.clone(), selector_config),
            creator: IdempotentCreator::new(downstream),
            mapper_config,
            catalog,
            clock,
            stream_id,
            running: AtomicBool::new(false),
        }
    }

    /// The stream this pipeline follows.
    pub fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Runs one cycle, unless one is already in flight.
    pub async fn run_cycle(&self) -> Result<std::result::Result<SyncReport, CycleSkipped>> {
        if self.running.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err()
        {
            warn!(stream = %self.stream_id, "cycle trigger discarded, previous cycle still running");
            return Ok(Err(CycleSkipped::Overlap));
        }
        let _guard = RunningGuard(&self.running);
        self.cycle().await.map(Ok)
    }

    async fn cycle(&self) -> Result<SyncReport> {
        let batch = self.consumer.fetch_batch().await?;
        let mut report = SyncReport {
            events: batch.events.len(),
            fetched: batch.orders.len(),
            failed: batch.failures.len(),
            skipped: batch.missing.len(),
            ..SyncReport::default()
        };

        // Event ids whose downstream handling failed with something
        // retryable; they bound the commit like fetch failures do.
        let mut unresolved = Vec::new();

        for fetched in &batch.orders {
            let order_id = fetched.event.object_id.clone();

            if let Err(reason) = lading_mapper::should_process(&fetched.order, &self.mapper_config)
            {
                info!(order_id, ?reason, "order outside pipeline responsibility, skipped");
                report.skipped += 1;
                continue;
            }

            let mapped = lading_mapper::map(
                &fetched.order,
                &self.mapper_config,
                self.catalog.as_ref(),
                self.clock.now(),
            );
            let Some(mut request) = mapped.request else {
                warn!(order_id, errors = ?mapped.errors, "order failed validation");
                report.failed += 1;
                continue;
            };
            report.mapped += 1;

            let choice = self.selector.select(&request).await;
            request.package_code = Some(choice.package_code.clone());
            request.service_code = Some(choice.service_code.clone());

            let create = ShipmentCreate {
                tags: vec![order_tag(&request.external_id)],
                request,
                carrier_id: choice.carrier_id,
            };

            match self.creator.ensure_created(&create).await {
                Ok(CreateOutcome::Created { .. }) => report.created += 1,
                Ok(CreateOutcome::Existing { .. }) => report.duplicates += 1,
                Err(error) if error.is_retryable() => {
                    warn!(order_id, %error, "shipment create failed, will retry next cycle");
                    report.failed += 1;
                    unresolved.push(fetched.event.id);
                }
                Err(error) => {
                    // Permanent failures do not hold the checkpoint; a
                    // replay would fail identically and wedge the stream.
                    warn!(order_id, %error, "shipment create failed permanently");
                    report.failed += 1;
                }
            }
        }

        report.committed_position = self.consumer.commit_through(&batch, &unresolved).await?;
        info!(
            stream = %self.stream_id,
            events = report.events,
            mapped = report.mapped,
            created = report.created,
            duplicates = report.duplicates,
            skipped = report.skipped,
            failed = report.failed,
            committed = ?report.committed_position,
            "sync cycle complete"
        );
        Ok(report)
    }
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use lading_core::checkpoint::MemoryCheckpointStore;
    use lading_core::error::SyncError;
    use lading_core::models::EventReason;
    use lading_core::time::TestClock;
    use lading_mapper::EmptyWeightCatalog;
    use lading_testing::{FakeOrderPlatform, FakeShippingPlatform, OrderBuilder};

    use super::*;
    use crate::carrier::SelectorConfig;

    fn pipeline(
        upstream: FakeOrderPlatform,
        downstream: Arc<FakeShippingPlatform>,
    ) -> SyncPipeline<FakeOrderPlatform, FakeShippingPlatform, MemoryCheckpointStore> {
        SyncPipeline::new(
            Arc::new(upstream),
            downstream,
            Arc::new(MemoryCheckpointStore::new()),
            Arc::new(TestClock::default()),
            ConsumerConfig::default(),
            SelectorConfig::default(),
            MapperConfig::default(),
            Arc::new(EmptyWeightCatalog),
        )
    }

    fn ready_order(id: &str) -> lading_core::models::SourceOrder {
        OrderBuilder::new(id).acknowledged().with_address().with_item("A1", 2, "5.00").build()
    }

    #[tokio::test]
    async fn cycle_creates_and_commits() {
        let upstream = FakeOrderPlatform::new();
        upstream.push_event(1, "R1", "order", EventReason::Create);
        upstream.put_order("R1", ready_order("R1"));
        let downstream = Arc::new(FakeShippingPlatform::new());
        downstream.set_carriers(vec![lading_core::models::Carrier {
            id: lading_core::models::CarrierId::new("c1"),
            code: "stamps_com".to_string(),
            name: "USPS".to_string(),
            active: true,
        }]);

        let pipeline = pipeline(upstream, downstream.clone());
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.committed_position, Some(1));
        assert_eq!(downstream.created_count(), 1);

        let shipment = downstream.find_by_external_id("R1").await.unwrap().unwrap();
        assert!(shipment.tags.contains(&order_tag("R1")));
    }

    #[tokio::test]
    async fn replayed_event_reports_duplicate_not_second_create() {
        let upstream = FakeOrderPlatform::new();
        upstream.push_event(1, "R1", "order", EventReason::Create);
        upstream.push_event(2, "R1", "order", EventReason::Create);
        upstream.put_order("R1", ready_order("R1"));
        let downstream = Arc::new(FakeShippingPlatform::new());

        let pipeline = pipeline(upstream, downstream.clone());
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(downstream.created_count(), 1);
    }

    #[tokio::test]
    async fn transient_create_failure_holds_checkpoint() {
        let upstream = FakeOrderPlatform::new();
        upstream.push_event(1, "R1", "order", EventReason::Create);
        upstream.push_event(2, "R2", "order", EventReason::Create);
        upstream.put_order("R1", ready_order("R1"));
        upstream.put_order("R2", ready_order("R2"));
        let downstream = Arc::new(FakeShippingPlatform::new());
        downstream.fail_create_for("R1", SyncError::transient("downstream", "503"));

        let pipeline = pipeline(upstream, downstream.clone());
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.committed_position, None);
    }

    #[tokio::test]
    async fn validation_failure_does_not_hold_checkpoint() {
        let upstream = FakeOrderPlatform::new();
        upstream.push_event(1, "R1", "order", EventReason::Create);
        // Acknowledged but with no address and no items.
        upstream.put_order("R1", OrderBuilder::new("R1").acknowledged().build());
        let downstream = Arc::new(FakeShippingPlatform::new());

        let pipeline = pipeline(upstream, downstream.clone());
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.created, 0);
        assert_eq!(report.committed_position, Some(1));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_discarded() {
        let upstream = FakeOrderPlatform::new();
        let pipeline = pipeline(upstream, Arc::new(FakeShippingPlatform::new()));
        pipeline.running.store(true, Ordering::SeqCst);

        let outcome = pipeline.run_cycle().await.unwrap();
        assert_eq!(outcome, Err(CycleSkipped::Overlap));

        pipeline.running.store(false, Ordering::SeqCst);
        assert!(pipeline.run_cycle().await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn skipped_orders_are_counted_not_failed() {
        let upstream = FakeOrderPlatform::new();
        upstream.push_event(1, "R1", "order", EventReason::Create);
        upstream.put_order(
            "R1",
            OrderBuilder::new("R1").acknowledged().test_order().with_address().build(),
        );
        let downstream = Arc::new(FakeShippingPlatform::new());

        let pipeline = pipeline(upstream, downstream.clone());
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.committed_position, Some(1));
        assert_eq!(downstream.created_count(), 0);
    }
}
