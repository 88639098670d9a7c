//! Collectors and the loop that drives the periodic ones
//!
//! ```text
//! collect → validate → write ──ok──────────────→ sleep(interval) ─┐
//!              │                                                  │
//!              ├─ connectivity error → drop handle, reconnect ────┤
//!              └─ anything else ─────→ log, sleep(interval) ──────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use crate::point::TimeSeriesPoint;
use crate::sink::{ResilientSink, SinkError, SinkHandle};
use crate::util::Shutdown;

pub mod bus;
pub mod health;
pub mod prices;
pub mod reachability;

/// Points produced by one collection cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub points: Vec<TimeSeriesPoint>,

    /// Whether the batch carries a down/alert state
    pub flagged: bool,
}

/// A collector sampled on a fixed cadence
#[async_trait]
pub trait Collector: Send {
    fn name(&self) -> &str;

    /// Run one cycle; `None` means there is nothing to write
    async fn collect(&mut self) -> anyhow::Result<Option<Batch>>;
}

/// Outcome of a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Written,
    Skipped,
    /// The handle failed and must be replaced before the next cycle
    Reconnect,
    Failed,
}

/// Collect once and write the result
pub async fn run_cycle<C: Collector>(
    collector: &mut C,
    sink: &ResilientSink,
    handle: &mut SinkHandle,
) -> CycleOutcome {
    let result = async {
        let Some(batch) = collector.collect().await? else {
            return Ok(false);
        };
        sink.write(handle, &batch.points, batch.flagged).await?;
        anyhow::Ok(true)
    }
    .await;

    match result {
        Ok(true) => CycleOutcome::Written,
        Ok(false) => CycleOutcome::Skipped,
        Err(e) => match e.downcast_ref::<SinkError>() {
            Some(sink_error) if sink_error.is_connectivity() => {
                error!("error with the time-series store: {sink_error}");
                CycleOutcome::Reconnect
            }
            _ => {
                error!("could not complete cycle: {e:#}");
                CycleOutcome::Failed
            }
        },
    }
}

/// Drive a collector until shutdown
#[instrument(skip_all, fields(collector = %collector.name()))]
pub async fn run_periodic<C: Collector>(
    mut collector: C,
    sink: ResilientSink,
    interval: Duration,
    mut shutdown: Shutdown,
) {
    info!(
        "starting with interval {}s, database {}",
        interval.as_secs(),
        sink.database()
    );

    let Some(mut handle) = connect_or_shutdown(&sink, &mut shutdown).await else {
        return;
    };

    while !shutdown.is_triggered() {
        match run_cycle(&mut collector, &sink, &mut handle).await {
            CycleOutcome::Reconnect => {
                let _ = handle.close().await;
                match connect_or_shutdown(&sink, &mut shutdown).await {
                    Some(fresh) => handle = fresh,
                    None => return,
                }
            }
            CycleOutcome::Written | CycleOutcome::Skipped | CycleOutcome::Failed => {
                if !shutdown.sleep(interval).await {
                    break;
                }
            }
        }
    }

    debug!("stopping");
    let _ = handle.close().await;
}

/// Connect to the sink unless shutdown comes first
pub async fn connect_or_shutdown(sink: &ResilientSink, shutdown: &mut Shutdown) -> Option<SinkHandle> {
    tokio::select! {
        handle = sink.connect_ready() => Some(handle),
        _ = shutdown.wait() => None,
    }
}
