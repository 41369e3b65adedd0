//! Polling scheduler driving the pipeline.
//!
//! A plain interval timer; the pipeline's own overlap guard handles
//! ticks that arrive while a cycle is still running. Shutdown lets the
//! in-flight cycle finish its batch rather than interrupting it
//! mid-commit.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lading_core::{checkpoint::CheckpointStore, platform::{OrderPlatform, ShippingPlatform}};
use lading_sync::{CycleSkipped, SyncPipeline};

/// Runs polling cycles until the token cancels or the stream turns
/// terminal.
pub async fn run<U, D, C>(
    pipeline: Arc<SyncPipeline<U, D, C>>,
    interval: Duration,
    shutdown: CancellationToken,
) where
    U: OrderPlatform,
    D: ShippingPlatform,
    C: CheckpointStore,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(stream = %pipeline.stream_id(), interval_seconds = interval.as_secs(), "scheduler started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!(stream = %pipeline.stream_id(), "scheduler stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        match pipeline.run_cycle().await {
            Ok(Ok(_report)) => {}
            Ok(Err(CycleSkipped::Overlap)) => {}
            Err(e) if e.is_terminal_for_stream() => {
                error!(
                    stream = %pipeline.stream_id(),
                    error = %e,
                    "stream is gone upstream; re-initialize the checkpoint to resume"
                );
                return;
            }
            Err(e) => {
                error!(stream = %pipeline.stream_id(), error = %e, "sync cycle failed");
            }
        }
    }
}
