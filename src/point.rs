//! The time-series point every collector produces
//!
//! A point is one timestamped, tagged, multi-field measurement. Points are
//! validated right before they are handed to a sink: a point without a
//! measurement name or without fields is never written.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single measurement ready for time-series storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    /// Logical series name (sensor group, metric family, table)
    pub measurement: String,

    /// Dimensional labels
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Sample time; the store assigns ingestion time when absent
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,

    /// Measured values
    pub fields: BTreeMap<String, f64>,
}

impl TimeSeriesPoint {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            time: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    pub fn with_fields<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(key, value)| (key.into(), value)));
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = Some(time);
        self
    }

    /// Check the invariants a point must hold before it may be written
    pub fn validate(&self) -> Result<(), PointError> {
        if self.measurement.trim().is_empty() {
            return Err(PointError::EmptyMeasurement);
        }

        if self.fields.is_empty() {
            return Err(PointError::NoFields {
                measurement: self.measurement.clone(),
            });
        }

        if let Some((key, value)) = self.fields.iter().find(|(_, value)| !value.is_finite()) {
            return Err(PointError::NonFiniteField {
                measurement: self.measurement.clone(),
                field: key.clone(),
                value: *value,
            });
        }

        Ok(())
    }
}

/// Reasons a point is rejected
#[derive(Debug, Clone, PartialEq)]
pub enum PointError {
    EmptyMeasurement,
    NoFields { measurement: String },
    NonFiniteField {
        measurement: String,
        field: String,
        value: f64,
    },
}

impl fmt::Display for PointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointError::EmptyMeasurement => write!(f, "point has an empty measurement"),
            PointError::NoFields { measurement } => {
                write!(f, "point '{measurement}' has no fields")
            }
            PointError::NonFiniteField {
                measurement,
                field,
                value,
            } => write!(
                f,
                "point '{measurement}' has a non-finite value for '{field}': {value}"
            ),
        }
    }
}

impl std::error::Error for PointError {}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
