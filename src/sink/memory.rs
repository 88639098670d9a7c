//! In-memory sink (no persistence)
//!
//! Keeps written points in process memory. It's useful for:
//! - Testing the collectors without a running store
//! - Dry runs (`"backend": "memory"`), where batches only show up in the logs
//!
//! Failures can be injected to exercise the reconnect paths.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::backend::{SinkClient, SinkConnector, TimePrecision};
use super::error::{SinkError, SinkResult};
use crate::point::TimeSeriesPoint;

/// Points older than this are evicted
const MAX_POINTS: usize = 10_000;

#[derive(Debug, Default)]
struct MemoryState {
    databases: BTreeSet<String>,
    points: VecDeque<(String, TimeSeriesPoint)>,
    connect_attempts: usize,
    failing_connects: usize,
    failing_writes: usize,
    generation: u64,
}

/// Shared in-memory store; clones see the same data
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemoryState>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // a poisoned lock only means a test panicked while holding it
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make the next `count` connection attempts fail
    pub fn fail_next_connects(&self, count: usize) {
        self.lock().failing_connects = count;
    }

    /// Make the next `count` writes fail with a connectivity error
    pub fn fail_next_writes(&self, count: usize) {
        self.lock().failing_writes = count;
    }

    /// Simulate the store restarting: every open handle goes stale
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().connect_attempts
    }

    pub fn databases(&self) -> Vec<String> {
        self.lock().databases.iter().cloned().collect()
    }

    /// All points written so far, oldest first
    pub fn points(&self) -> Vec<TimeSeriesPoint> {
        self.lock().points.iter().map(|(_, p)| p.clone()).collect()
    }

    /// Points written to one database
    pub fn points_in(&self, database: &str) -> Vec<TimeSeriesPoint> {
        self.lock()
            .points
            .iter()
            .filter(|(db, _)| db == database)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

#[async_trait]
impl SinkConnector for MemorySink {
    async fn connect(&self) -> SinkResult<Box<dyn SinkClient>> {
        let mut state = self.lock();
        state.connect_attempts += 1;

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(SinkError::Unreachable(String::from("connection refused")));
        }

        Ok(Box::new(MemoryClient {
            sink: self.clone(),
            database: None,
            generation: state.generation,
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        String::from("memory")
    }
}

/// Handle to a `MemorySink`
pub struct MemoryClient {
    sink: MemorySink,
    database: Option<String>,
    generation: u64,
    closed: bool,
}

impl MemoryClient {
    fn check_open(&self, state: &MemoryState) -> SinkResult<()> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        if state.generation != self.generation {
            return Err(SinkError::Unreachable(String::from("connection reset")));
        }
        Ok(())
    }
}

#[async_trait]
impl SinkClient for MemoryClient {
    async fn create_database(&mut self, name: &str) -> SinkResult<()> {
        let mut state = self.sink.lock();
        self.check_open(&state)?;
        state.databases.insert(name.to_string());
        Ok(())
    }

    async fn switch_database(&mut self, name: &str) -> SinkResult<()> {
        self.database = Some(name.to_string());
        Ok(())
    }

    async fn write_points(
        &mut self,
        points: &[TimeSeriesPoint],
        _precision: TimePrecision,
    ) -> SinkResult<()> {
        let database = self.database.clone().ok_or(SinkError::NoDatabase)?;
        let mut state = self.sink.lock();
        self.check_open(&state)?;

        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(SinkError::Unreachable(String::from("broken pipe")));
        }

        for point in points {
            if state.points.len() >= MAX_POINTS {
                state.points.pop_front();
            }
            state.points.push_back((database.clone(), point.clone()));
        }

        debug!("in-memory sink: stored {} points in {database}", points.len());
        Ok(())
    }

    async fn close(&mut self) -> SinkResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_connect_failures() {
        let sink = MemorySink::new();
        sink.fail_next_connects(1);

        assert!(sink.connect().await.is_err());
        assert!(sink.connect().await.is_ok());
        assert_eq!(sink.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn test_points_are_kept_per_database() {
        let sink = MemorySink::new();
        let mut client = sink.connect().await.unwrap();
        client.create_database("a").await.unwrap();
        client.switch_database("a").await.unwrap();

        let points = vec![TimeSeriesPoint::new("m").with_field("v", 1.0)];
        client
            .write_points(&points, TimePrecision::Seconds)
            .await
            .unwrap();

        assert_eq!(sink.databases(), vec!["a".to_string()]);
        assert_eq!(sink.points_in("a"), points);
        assert!(sink.points_in("b").is_empty());
    }

    #[tokio::test]
    async fn test_stale_handle_after_drop_connections() {
        let sink = MemorySink::new();
        let mut client = sink.connect().await.unwrap();
        client.switch_database("a").await.unwrap();

        sink.drop_connections();

        let points = vec![TimeSeriesPoint::new("m").with_field("v", 1.0)];
        let err = client
            .write_points(&points, TimePrecision::Seconds)
            .await
            .unwrap_err();
        assert!(err.is_connectivity());
    }
}
