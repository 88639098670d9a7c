//! Host health sampling
//!
//! Reads CPU, memory, disk and an optional temperature sensor into one
//! snapshot and flags it when any reading is above its limit. A missing
//! sensor reads as -1.

use async_trait::async_trait;
use sysinfo::{Components, Disks, System};
use tracing::{debug, instrument, trace};

use super::{Batch, Collector};
use crate::point::{TimeSeriesPoint, round1};

/// Value recorded for a metric that could not be read
pub const UNAVAILABLE: f64 = -1.0;

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Total and available amount of a resource, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub total: u64,
    pub available: u64,
}

/// Source of local hardware readings
///
/// Every reading may be missing; the sampler substitutes the sentinel.
pub trait MetricsProvider: Send {
    fn cpu_percent(&mut self) -> Option<f32>;
    fn memory(&mut self) -> Option<Capacity>;
    fn disk(&mut self) -> Option<Capacity>;
    fn temperature(&mut self) -> Option<f32>;
}

/// Readings from the local system through sysinfo
pub struct SysinfoProvider {
    system: System,
    sensor: String,
}

impl SysinfoProvider {
    pub fn new(sensor: impl Into<String>) -> Self {
        let mut system = System::new();
        // usage is computed between two refreshes; prime the first one
        system.refresh_cpu_usage();

        Self {
            system,
            sensor: sensor.into(),
        }
    }
}

impl MetricsProvider for SysinfoProvider {
    fn cpu_percent(&mut self) -> Option<f32> {
        self.system.refresh_cpu_usage();
        if self.system.cpus().is_empty() {
            return None;
        }
        Some(self.system.global_cpu_usage())
    }

    fn memory(&mut self) -> Option<Capacity> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        (total > 0).then(|| Capacity {
            total,
            available: self.system.available_memory(),
        })
    }

    fn disk(&mut self) -> Option<Capacity> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .find(|disk| disk.mount_point() == std::path::Path::new("/"))
            .filter(|disk| disk.total_space() > 0)
            .map(|disk| Capacity {
                total: disk.total_space(),
                available: disk.available_space(),
            })
    }

    fn temperature(&mut self) -> Option<f32> {
        let components = Components::new_with_refreshed_list();
        components
            .iter()
            .find(|component| component.label().contains(self.sensor.as_str()))
            .and_then(|component| component.temperature())
    }
}

/// One reading of the host's health
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSnapshot {
    pub cpu_percent: f64,
    /// MB
    pub ram_busy: f64,
    /// MB
    pub ram_total: f64,
    pub ram_percent: f64,
    /// GB
    pub disk_busy: f64,
    /// GB
    pub disk_total: f64,
    pub disk_percent: f64,
    pub cpu_temperature: f64,
}

/// (busy, total, percent busy), scaled by `unit`
fn usage(capacity: Option<Capacity>, unit: f64) -> (f64, f64, f64) {
    match capacity {
        Some(Capacity { total, available }) if total > 0 => {
            let total = total as f64 / unit;
            let available = available as f64 / unit;
            let busy = total - available;
            (round1(busy), round1(total), round1(busy / total * 100.0))
        }
        _ => (UNAVAILABLE, UNAVAILABLE, UNAVAILABLE),
    }
}

impl HealthSnapshot {
    pub fn read(provider: &mut dyn MetricsProvider) -> Self {
        let cpu_percent = provider
            .cpu_percent()
            .map(|cpu| round1(f64::from(cpu)))
            .unwrap_or(UNAVAILABLE);
        let (ram_busy, ram_total, ram_percent) = usage(provider.memory(), MB);
        let (disk_busy, disk_total, disk_percent) = usage(provider.disk(), GB);
        let cpu_temperature = provider
            .temperature()
            .map(|temp| round1(f64::from(temp)))
            .unwrap_or(UNAVAILABLE);

        Self {
            cpu_percent,
            ram_busy,
            ram_total,
            ram_percent,
            disk_busy,
            disk_total,
            disk_percent,
            cpu_temperature,
        }
    }
}

/// Limits above which the hardware alert is raised
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub cpu_percent: f64,
    pub temperature: f64,
    pub ram_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 50.0,
            temperature: 60.0,
            ram_percent: 60.0,
        }
    }
}

impl AlertThresholds {
    /// Whether any limit is exceeded; sentinel values never exceed
    pub fn evaluate(&self, snapshot: &HealthSnapshot) -> bool {
        snapshot.cpu_percent > self.cpu_percent
            || snapshot.cpu_temperature > self.temperature
            || snapshot.ram_percent > self.ram_percent
    }
}

pub struct HealthSampler<P> {
    provider: P,
    thresholds: AlertThresholds,
    table: String,
}

impl<P: MetricsProvider> HealthSampler<P> {
    pub fn new(provider: P, thresholds: AlertThresholds, table: impl Into<String>) -> Self {
        Self {
            provider,
            thresholds,
            table: table.into(),
        }
    }

    pub fn sample_once(&mut self) -> HealthSnapshot {
        HealthSnapshot::read(&mut self.provider)
    }

    pub fn to_point(&self, snapshot: &HealthSnapshot) -> (TimeSeriesPoint, bool) {
        let alert = self.thresholds.evaluate(snapshot);
        let point = TimeSeriesPoint::new(&self.table)
            .with_field("porcentaje_uso_cpu", snapshot.cpu_percent)
            .with_field("ram_ocupada", snapshot.ram_busy)
            .with_field("ram_total", snapshot.ram_total)
            .with_field("porcentaje_ram", snapshot.ram_percent)
            .with_field("memoria_ocupada", snapshot.disk_busy)
            .with_field("memoria_total", snapshot.disk_total)
            .with_field("porcentaje_memoria", snapshot.disk_percent)
            .with_field("temperatura_cpu", snapshot.cpu_temperature)
            .with_field("alerta_hardware", if alert { 1.0 } else { 0.0 });

        (point, alert)
    }
}

#[async_trait]
impl<P: MetricsProvider> Collector for HealthSampler<P> {
    fn name(&self) -> &str {
        "health"
    }

    #[instrument(skip_all)]
    async fn collect(&mut self) -> anyhow::Result<Option<Batch>> {
        let snapshot = self.sample_once();
        trace!("{snapshot:?}");

        let (point, alert) = self.to_point(&snapshot);
        if alert {
            debug!("hardware limits exceeded");
        }

        Ok(Some(Batch {
            points: vec![point],
            flagged: alert,
        }))
    }
}
