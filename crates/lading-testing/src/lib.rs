//! In-memory platform fakes and order fixtures.
//!
//! Everything the pipeline needs to run without a network: a scriptable
//! order platform, a scriptable shipping platform, and a builder for
//! plausible upstream orders. Failures are injected per call site so
//! tests can exercise exactly one failure mode at a time.

#![forbid(unsafe_code)]

mod order_builder;
mod shipping;
mod upstream;

pub use order_builder::OrderBuilder;
pub use shipping::FakeShippingPlatform;
pub use upstream::FakeOrderPlatform;
