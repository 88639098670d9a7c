//! Retry discipline shared by every collector
//!
//! `ResilientSink` owns the initial connect and the reconnect path. It does
//! not heal on write failure: a collector that sees a connectivity error
//! drops its handle and calls `connect_ready` again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use super::backend::{SinkClient, SinkConnector, TimePrecision};
use super::error::SinkResult;
use crate::point::TimeSeriesPoint;

/// Connection handle owned by a single worker
pub type SinkHandle = Box<dyn SinkClient>;

#[derive(Clone)]
pub struct ResilientSink {
    connector: Arc<dyn SinkConnector>,
    database: String,
    retry_delay: Duration,
}

impl ResilientSink {
    pub fn new(
        connector: Arc<dyn SinkConnector>,
        database: impl Into<String>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            connector,
            database: database.into(),
            retry_delay,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Obtain a handle, retrying forever with a fixed delay
    #[instrument(skip(self), fields(sink = %self.connector.describe()))]
    pub async fn connect(&self) -> SinkHandle {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;

            match self.connector.connect().await {
                Ok(handle) => {
                    info!("connected to time-series store after {attempt} attempt(s)");
                    return handle;
                }
                Err(e) => {
                    error!(attempt, "could not connect to time-series store: {e}");
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Create the configured database if absent and select it
    pub async fn ensure_database(&self, handle: &mut SinkHandle) -> SinkResult<()> {
        handle.create_database(&self.database).await?;
        handle.switch_database(&self.database).await
    }

    /// Connect and select the database, retrying both as one unit
    pub async fn connect_ready(&self) -> SinkHandle {
        loop {
            let mut handle = self.connect().await;

            match self.ensure_database(&mut handle).await {
                Ok(()) => return handle,
                Err(e) => {
                    error!(database = %self.database, "could not prepare database: {e}");
                    let _ = handle.close().await;
                    tokio::time::sleep(self.retry_delay).await;
                }
            }
        }
    }

    /// Write one batch; `flagged` marks a batch carrying a down/alert state
    pub async fn write(
        &self,
        handle: &mut SinkHandle,
        points: &[TimeSeriesPoint],
        flagged: bool,
    ) -> SinkResult<()> {
        for point in points {
            point.validate()?;
        }

        handle.write_points(points, TimePrecision::Seconds).await?;

        let rendered = serde_json::to_string(points).unwrap_or_default();
        if flagged {
            warn!(database = %self.database, "{rendered}");
        } else {
            info!(database = %self.database, "{rendered}");
        }

        Ok(())
    }
}
