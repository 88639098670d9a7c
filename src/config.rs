use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::trace;

use crate::monitors::health::AlertThresholds;
use crate::monitors::prices::{Indicator, default_indicators};
use crate::supervisor::WorkerKind;

/// Time-series sink configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum SinkConfig {
    /// InfluxDB 1.x compatible HTTP API
    Influx {
        #[serde(default = "default_influx_url")]
        url: String,
        username: Option<String>,
        password: Option<String>,
    },

    /// In-process store, nothing is persisted
    Memory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Influx {
            url: default_influx_url(),
            username: None,
            password: None,
        }
    }
}

fn default_influx_url() -> String {
    String::from("http://localhost:8086")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sink: SinkConfig,

    /// One of trace, debug, info, warn, error
    pub log_level: Option<String>,

    #[serde(default)]
    pub supervisor: SupervisorConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub health: HealthConfig,

    pub prices: Option<PricesConfig>,

    pub mqtt: Option<BusConfig>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SupervisorConfig {
    /// Seconds between wake-ups of the idle loop
    #[serde(default = "default_idle_interval")]
    pub idle_interval: u64,

    /// Cron expression (sec min hour day month weekday), local time
    #[serde(default = "default_price_schedule")]
    pub price_schedule: String,

    /// Workers launched in the background at start
    #[serde(default = "default_workers")]
    pub workers: Vec<WorkerKind>,

    /// Explicit executable paths, keyed by worker
    #[serde(default)]
    pub executables: Executables,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            idle_interval: default_idle_interval(),
            price_schedule: default_price_schedule(),
            workers: default_workers(),
            executables: Executables::default(),
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Executables {
    pub devices: Option<PathBuf>,
    pub health: Option<PathBuf>,
    pub prices: Option<PathBuf>,
    pub mqtt: Option<PathBuf>,
}

impl Executables {
    pub fn get(&self, kind: WorkerKind) -> Option<&Path> {
        match kind {
            WorkerKind::Devices => self.devices.as_deref(),
            WorkerKind::Health => self.health.as_deref(),
            WorkerKind::Prices => self.prices.as_deref(),
            WorkerKind::Mqtt => self.mqtt.as_deref(),
        }
    }
}

fn default_idle_interval() -> u64 {
    60
}

fn default_price_schedule() -> String {
    String::from("0 0 21,22,23 * * *")
}

fn default_workers() -> Vec<WorkerKind> {
    vec![WorkerKind::Devices, WorkerKind::Health]
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DevicesConfig {
    #[serde(default = "default_devices_interval")]
    pub interval: u64,
    #[serde(default = "default_devices_database")]
    pub database: String,
    #[serde(default = "default_devices_table")]
    pub table: String,
    #[serde(default)]
    pub hostnames: Vec<String>,
    /// Probe timeout and sink retry delay, in seconds
    #[serde(default = "default_devices_timeout")]
    pub timeout: u64,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            interval: default_devices_interval(),
            database: default_devices_database(),
            table: default_devices_table(),
            hostnames: vec![],
            timeout: default_devices_timeout(),
        }
    }
}

fn default_devices_interval() -> u64 {
    30
}

fn default_devices_database() -> String {
    String::from("check_devices")
}

fn default_devices_table() -> String {
    String::from("data_check_devices")
}

fn default_devices_timeout() -> u64 {
    2
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval: u64,
    #[serde(default = "default_health_database")]
    pub database: String,
    #[serde(default = "default_health_table")]
    pub table: String,
    #[serde(default = "default_health_timeout")]
    pub timeout: u64,
    /// Label of the temperature sensor to read
    #[serde(default = "default_temperature_sensor")]
    pub sensor: String,
    #[serde(default)]
    pub thresholds: AlertThresholds,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: default_health_interval(),
            database: default_health_database(),
            table: default_health_table(),
            timeout: default_health_timeout(),
            sensor: default_temperature_sensor(),
            thresholds: AlertThresholds::default(),
        }
    }
}

fn default_health_interval() -> u64 {
    30
}

fn default_health_database() -> String {
    String::from("raspberry")
}

fn default_health_table() -> String {
    String::from("data_raspberry")
}

fn default_health_timeout() -> u64 {
    100
}

fn default_temperature_sensor() -> String {
    String::from("cpu_thermal")
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PricesConfig {
    /// API token; falls back to GRIDWATCH_FEED_TOKEN
    pub token: Option<String>,
    #[serde(default = "default_feed_url")]
    pub url: String,
    #[serde(default = "default_prices_database")]
    pub database: String,
    #[serde(default = "default_prices_timeout")]
    pub timeout: u64,
    #[serde(default = "default_indicators")]
    pub indicators: Vec<Indicator>,
}

pub const FEED_TOKEN_VAR: &str = "GRIDWATCH_FEED_TOKEN";

impl PricesConfig {
    pub fn resolve_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| std::env::var(FEED_TOKEN_VAR).ok())
            .filter(|token| !token.trim().is_empty())
    }
}

fn default_feed_url() -> String {
    String::from("https://api.esios.ree.es")
}

fn default_prices_database() -> String {
    String::from("esios")
}

fn default_prices_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct BusConfig {
    /// Broker host name or address
    pub broker: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_bus_database")]
    pub database: String,
    /// Sink retry delay and pause between broker sessions, in seconds
    #[serde(default = "default_bus_timeout")]
    pub timeout: u64,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
    /// Capacity of the queue between the broker loop and the writer
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_broker_port() -> u16 {
    1883
}

fn default_bus_database() -> String {
    String::from("mqtt")
}

fn default_bus_timeout() -> u64 {
    10
}

fn default_client_id() -> String {
    String::from("gridwatch-mqtt")
}

fn default_keep_alive() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    64
}

pub fn read_config_file(path: impl AsRef<Path>) -> anyhow::Result<Config> {
    let path = path.as_ref();
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file {}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
