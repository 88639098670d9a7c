//! Time-series sink
//!
//! ## Design
//!
//! - **Trait-based**: `SinkConnector`/`SinkClient` hide the concrete store
//! - **Owned handles**: each worker owns its handle and replaces it on failure
//! - **Resilient connect**: `ResilientSink` retries the connect forever
//!
//! ## Backends
//!
//! - **InfluxDB** (default): HTTP API, line protocol, second precision
//! - **In-Memory**: no persistence, for tests and dry runs

use std::sync::Arc;
use std::time::Duration;

use crate::config::SinkConfig;

pub mod backend;
pub mod connector;
pub mod error;
pub mod influx;
pub mod memory;

pub use backend::{SinkClient, SinkConnector, TimePrecision};
pub use connector::{ResilientSink, SinkHandle};
pub use error::{SinkError, SinkResult};

/// Build the connector described by the configuration
pub fn connector_from_config(config: &SinkConfig, timeout: Duration) -> Arc<dyn SinkConnector> {
    match config {
        SinkConfig::Influx {
            url,
            username,
            password,
        } => {
            let mut connector = influx::InfluxConnector::new(url.clone(), timeout);
            if let (Some(username), Some(password)) = (username, password) {
                connector = connector.with_credentials(username.clone(), password.clone());
            }
            Arc::new(connector)
        }
        SinkConfig::Memory => Arc::new(memory::MemorySink::new()),
    }
}
