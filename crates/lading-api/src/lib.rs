//! HTTP surface and service wiring: configuration, the webhook server,
//! and the polling scheduler.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod scheduler;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server, AppState};
