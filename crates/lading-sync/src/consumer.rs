//! Event-stream consumption with checkpointed positions.
//!
//! Each polling cycle walks Fetching, Filtering, DetailFetching and
//! Committing. The commit rule is the load-bearing part: the checkpoint
//! never advances past an event whose order fetch is still unresolved,
//! because a position past it permanently hides that order.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lading_core::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::{Result, SyncError},
    models::{EventReason, SourceOrder, StreamEvent, StreamId},
    platform::OrderPlatform,
    time::Clock,
};

/// Consumer tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Stream to poll.
    pub stream_id: StreamId,
    /// Object type the sync cares about.
    pub object_type: String,
    /// Event reasons that survive filtering.
    pub event_reasons: Vec<EventReason>,
    /// When false, events are consumed id-only and no order bodies are
    /// fetched (used for backfill position repair).
    pub detail_fetch: bool,
    /// Order count above which fan-out degrades to sequential batches.
    pub parallel_threshold: usize,
    /// Batch size used in the degraded mode.
    pub fan_out_batch: usize,
    /// Pause between degraded-mode batches.
    #[serde(with = "duration_millis")]
    pub batch_delay: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            stream_id: StreamId::new("orders"),
            object_type: "order".to_string(),
            event_reasons: vec![EventReason::Create],
            detail_fetch: true,
            parallel_threshold: 50,
            fan_out_batch: 25,
            batch_delay: Duration::from_millis(500),
        }
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// One order body fetched for an event.
#[derive(Debug, Clone)]
pub struct FetchedOrder {
    /// The event that referenced this order.
    pub event: StreamEvent,
    /// The fetched body.
    pub order: SourceOrder,
}

/// A detail fetch that failed with a retryable error. The event id stays
/// unresolved and bounds the commit.
#[derive(Debug, Clone)]
pub struct FetchFailure {
    /// Event whose order could not be fetched this cycle.
    pub event_id: u64,
    /// Order the event referenced.
    pub order_id: String,
    /// The failure.
    pub error: SyncError,
}

/// Outcome of the fetch half of a cycle, handed back to the pipeline and
/// later to [`EventStreamConsumer::commit_through`].
#[derive(Debug)]
pub struct EventBatch {
    /// Checkpoint the batch was fetched against. Its version is the CAS
    /// guard for the commit.
    pub checkpoint: Checkpoint,
    /// Surviving events, ascending by id, deduplicated.
    pub events: Vec<StreamEvent>,
    /// Fetched order bodies. Empty in id-only mode.
    pub orders: Vec<FetchedOrder>,
    /// Unresolved per-event fetch failures.
    pub failures: Vec<FetchFailure>,
    /// Events whose order was deleted upstream before the fetch. Resolved
    /// as skips; they do not bound the commit.
    pub missing: Vec<u64>,
    /// Whether order bodies were fetched at all.
    pub detail_fetched: bool,
}

impl EventBatch {
    /// True when the cycle had nothing to do.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Checkpointed consumer over one upstream event stream.
pub struct EventStreamConsumer<P, S> {
    platform: Arc<P>,
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: ConsumerConfig,
}

impl<P: OrderPlatform, S: CheckpointStore> EventStreamConsumer<P, S> {
    /// Creates a consumer for the configured stream.
    pub fn new(platform: Arc<P>, store: Arc<S>, clock: Arc<dyn Clock>, config: ConsumerConfig) -> Self {
        Self { platform, store, clock, config }
    }

    /// The stream this consumer follows.
    pub fn stream_id(&self) -> &StreamId {
        &self.config.stream_id
    }

    /// Runs Fetching through DetailFetching and returns the batch.
    ///
    /// A failure to reach the event feed aborts the cycle here and leaves
    /// the checkpoint untouched. Per-order failures do not abort; they
    /// come back inside the batch.
    pub async fn fetch_batch(&self) -> Result<EventBatch> {
        let checkpoint = self
            .store
            .load(&self.config.stream_id)
            .await?
            .unwrap_or_else(|| Checkpoint::initial(self.config.stream_id.clone(), self.clock.now()));

        let page =
            self.platform.events_since(&self.config.stream_id, checkpoint.position).await?;

        let events = self.filter(page.events);
        debug!(
            stream = %self.config.stream_id,
            position = ?checkpoint.position,
            surviving = events.len(),
            "fetched event batch"
        );

        if !self.config.detail_fetch || events.is_empty() {
            return Ok(EventBatch {
                checkpoint,
                events,
                orders: Vec::new(),
                failures: Vec::new(),
                missing: Vec::new(),
                detail_fetched: false,
            });
        }

        let (orders, failures, missing) = self.fetch_details(&events).await;
        Ok(EventBatch { checkpoint, events, orders, failures, missing, detail_fetched: true })
    }

    /// Filtering: target object type, configured reasons, in-batch dedupe
    /// by event id, ascending order.
    fn filter(&self, events: Vec<StreamEvent>) -> Vec<StreamEvent> {
        let mut seen = HashSet::new();
        let mut kept: Vec<StreamEvent> = events
            .into_iter()
            .filter(|e| e.object_type == self.config.object_type)
            .filter(|e| self.config.event_reasons.contains(&e.event_reason))
            .filter(|e| seen.insert(e.id))
            .collect();
        kept.sort_by_key(|e| e.id);
        kept
    }

    async fn fetch_details(
        &self,
        events: &[StreamEvent],
    ) -> (Vec<FetchedOrder>, Vec<FetchFailure>, Vec<u64>) {
        let mut orders = Vec::new();
        let mut failures = Vec::new();
        let mut missing = Vec::new();

        if events.len() <= self.config.parallel_threshold {
            let results = futures::future::join_all(events.iter().map(|e| self.fetch_one(e))).await;
            for outcome in results {
                record(outcome, &mut orders, &mut failures, &mut missing);
            }
            return (orders, failures, missing);
        }

        // Large batch: sequential chunks with a pause, so a backlog drain
        // does not exhaust the upstream rate limit.
        warn!(
            count = events.len(),
            chunk = self.config.fan_out_batch,
            "large batch, degrading to chunked detail fetch"
        );
        for (i, chunk) in events.chunks(self.config.fan_out_batch).enumerate() {
            if i > 0 {
                self.clock.sleep(self.config.batch_delay).await;
            }
            let results = futures::future::join_all(chunk.iter().map(|e| self.fetch_one(e))).await;
            for outcome in results {
                record(outcome, &mut orders, &mut failures, &mut missing);
            }
        }
        (orders, failures, missing)
    }

    async fn fetch_one(&self, event: &StreamEvent) -> FetchOutcome {
        match self.platform.fetch_order(&event.object_id).await {
            Ok(order) => FetchOutcome::Fetched(FetchedOrder { event: event.clone(), order }),
            Err(SyncError::OrderNotFound { order_id }) => {
                warn!(event_id = event.id, order_id, "order deleted upstream before fetch");
                FetchOutcome::Missing(event.id)
            }
            Err(error) => {
                warn!(event_id = event.id, order_id = %event.object_id, %error, "detail fetch failed");
                FetchOutcome::Failed(FetchFailure {
                    event_id: event.id,
                    order_id: event.object_id.clone(),
                    error,
                })
            }
        }
    }

    /// Committing: advances the checkpoint as far as the batch outcome
    /// allows and returns the committed position, if it moved.
    ///
    /// `also_unresolved` carries event ids whose downstream handling hit a
    /// retryable failure after the fetch; they bound the commit exactly
    /// like fetch failures. In id-only mode the tail commits
    /// unconditionally since no per-event outcome is pending.
    pub async fn commit_through(
        &self,
        batch: &EventBatch,
        also_unresolved: &[u64],
    ) -> Result<Option<u64>> {
        let Some(tail) = batch.events.last().map(|e| e.id) else {
            return Ok(None);
        };

        let target = if !batch.detail_fetched {
            Some(tail)
        } else {
            let unresolved: HashSet<u64> = batch
                .failures
                .iter()
                .map(|f| f.event_id)
                .chain(also_unresolved.iter().copied())
                .collect();
            let mut last_good = None;
            for event in &batch.events {
                if unresolved.contains(&event.id) {
                    break;
                }
                last_good = Some(event.id);
            }
            last_good
        };

        let Some(position) = target else {
            warn!(stream = %self.config.stream_id, "first event unresolved, checkpoint not advanced");
            return Ok(None);
        };
        if batch.checkpoint.position.is_some_and(|p| p >= position) {
            return Ok(None);
        }

        let advanced = batch.checkpoint.advanced_to(position, self.clock.now());
        // A loaded record always has a nonzero version; zero means the
        // stream has no record yet and the save must create one.
        let expected = (batch.checkpoint.version > 0).then_some(batch.checkpoint.version);
        self.store.save(&advanced, expected).await?;
        debug!(stream = %self.config.stream_id, position, "checkpoint advanced");
        Ok(Some(position))
    }
}

enum FetchOutcome {
    Fetched(FetchedOrder),
    Missing(u64),
    Failed(FetchFailure),
}

fn record(
    outcome: FetchOutcome,
    orders: &mut Vec<FetchedOrder>,
    failures: &mut Vec<FetchFailure>,
    missing: &mut Vec<u64>,
) {
    match outcome {
        FetchOutcome::Fetched(order) => orders.push(order),
        FetchOutcome::Missing(id) => missing.push(id),
        FetchOutcome::Failed(failure) => failures.push(failure),
    }
}
