//! Sink collaborator traits
//!
//! A `SinkConnector` knows how to open a connection to a time-series store;
//! the `SinkClient` it returns is the connection handle. A handle is owned by
//! exactly one worker and is discarded, never repaired, when it fails.

use async_trait::async_trait;

use super::error::SinkResult;
use crate::point::TimeSeriesPoint;

/// Timestamp precision used when encoding points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimePrecision {
    #[default]
    Seconds,
    Milliseconds,
}

impl TimePrecision {
    /// Precision code understood by the store's write endpoint
    pub fn as_code(&self) -> &'static str {
        match self {
            TimePrecision::Seconds => "s",
            TimePrecision::Milliseconds => "ms",
        }
    }
}

/// An open connection to a time-series store
#[async_trait]
pub trait SinkClient: Send {
    /// Create the logical database if it does not exist yet
    async fn create_database(&mut self, name: &str) -> SinkResult<()>;

    /// Select the database subsequent writes go to
    async fn switch_database(&mut self, name: &str) -> SinkResult<()>;

    /// Write a batch of points to the selected database
    async fn write_points(
        &mut self,
        points: &[TimeSeriesPoint],
        precision: TimePrecision,
    ) -> SinkResult<()>;

    /// Release the connection
    async fn close(&mut self) -> SinkResult<()>;
}

/// Factory for connection handles
#[async_trait]
pub trait SinkConnector: Send + Sync {
    async fn connect(&self) -> SinkResult<Box<dyn SinkClient>>;

    /// Human readable target for log lines
    fn describe(&self) -> String;
}
