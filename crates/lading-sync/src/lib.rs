//! The synchronization engine: event consumption, carrier selection,
//! idempotent shipment creation and tracking reconciliation, composed
//! into a per-stream pipeline.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod carrier;
pub mod consumer;
pub mod dedupe;
pub mod pipeline;
pub mod reconcile;

pub use carrier::{CarrierChoice, CarrierSelector, SelectorConfig};
pub use consumer::{ConsumerConfig, EventBatch, EventStreamConsumer, FetchedOrder};
pub use dedupe::{CreateOutcome, IdempotentCreator, IdentifierLookup, OrderIdentifiers};
pub use pipeline::{CycleSkipped, SyncPipeline, SyncReport};
pub use reconcile::{ReconcileOutcome, TrackingReconciler};
