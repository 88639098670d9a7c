//! Helper functions for integration tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gridwatch::TimeSeriesPoint;
use gridwatch::monitors::health::{Capacity, MetricsProvider};
use gridwatch::monitors::reachability::ReachabilityProbe;
use gridwatch::monitors::{Batch, Collector};
use gridwatch::sink::ResilientSink;
use gridwatch::sink::memory::MemorySink;

pub const RETRY_DELAY: Duration = Duration::from_millis(10);

pub fn memory_sink(database: &str) -> (MemorySink, ResilientSink) {
    let memory = MemorySink::new();
    let sink = ResilientSink::new(Arc::new(memory.clone()), database, RETRY_DELAY);
    (memory, sink)
}

/// Poll `condition` until it holds or two seconds have passed
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Emits one point per cycle with an increasing counter
pub struct CountingCollector {
    pub count: f64,
}

#[async_trait]
impl Collector for CountingCollector {
    fn name(&self) -> &str {
        "counting"
    }

    async fn collect(&mut self) -> anyhow::Result<Option<Batch>> {
        self.count += 1.0;
        Ok(Some(Batch {
            points: vec![TimeSeriesPoint::new("counter").with_field("n", self.count)],
            flagged: false,
        }))
    }
}

/// Fails every other cycle with an unclassified error
pub struct FlakyCollector {
    pub calls: usize,
}

#[async_trait]
impl Collector for FlakyCollector {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn collect(&mut self) -> anyhow::Result<Option<Batch>> {
        self.calls += 1;
        if self.calls % 2 == 1 {
            anyhow::bail!("sensor bus busy");
        }
        Ok(Some(Batch {
            points: vec![TimeSeriesPoint::new("flaky").with_field("calls", self.calls as f64)],
            flagged: false,
        }))
    }
}

/// Every host whose name starts with "up" answers
pub struct PrefixProbe;

#[async_trait]
impl ReachabilityProbe for PrefixProbe {
    async fn probe(&self, host: &str, _timeout: Duration) -> Option<Duration> {
        host.starts_with("up").then_some(Duration::from_millis(1))
    }
}

/// Fixed readings of a hot, busy host
pub struct HotHost;

impl MetricsProvider for HotHost {
    fn cpu_percent(&mut self) -> Option<f32> {
        Some(93.0)
    }

    fn memory(&mut self) -> Option<Capacity> {
        Some(Capacity {
            total: 1024 * 1024 * 1024,
            available: 512 * 1024 * 1024,
        })
    }

    fn disk(&mut self) -> Option<Capacity> {
        None
    }

    fn temperature(&mut self) -> Option<f32> {
        Some(72.5)
    }
}
