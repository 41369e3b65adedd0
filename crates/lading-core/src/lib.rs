//! Core domain types for the order-to-shipment sync service.
//!
//! Provides the data model shared by the mapper, the sync pipeline, and
//! the platform clients, plus the error taxonomy, the checkpoint store
//! contract, and the clock abstraction. All other crates depend on these
//! foundations.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod error;
pub mod models;
pub mod platform;
pub mod time;

pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use error::{Result, SyncError};
pub use models::{
    Carrier, CarrierId, CarrierPreference, DownstreamShipment, EventPage, EventReason,
    LifecycleState, NormalizedShipmentRequest, ShipmentAddress, ShipmentCreate, ShipmentItem,
    ShipmentLabel, SourceAddress, SourceLineItem, SourceOrder, StreamEvent, StreamId,
    TrackingUpdate,
};
pub use platform::{OrderPlatform, ShippingPlatform};
pub use time::{Clock, RealClock, TestClock};
