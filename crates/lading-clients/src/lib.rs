//! HTTP implementations of the platform traits.
//!
//! `OrderPlatformClient` talks to the source order-management platform,
//! `ShippingPlatformClient` to the downstream shipping platform. Both
//! share the retry policy and error classification in [`retry`] and
//! [`http`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod downstream;
pub mod http;
pub mod retry;
pub mod upstream;

pub use downstream::ShippingPlatformClient;
pub use http::ClientConfig;
pub use retry::{with_retry, RetryPolicy};
pub use upstream::OrderPlatformClient;
