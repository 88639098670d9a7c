//! Day-ahead price feed
//!
//! Downloads hourly price indicators for a date range, keeps only the rows
//! for the geography each indicator is about, and reshapes them into points.
//! The fetch is one-shot: it is triggered by the supervisor's schedule and
//! a run that finds no data is retried on the next trigger, never here.

use std::fmt;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, error, info, instrument, warn};

use crate::point::TimeSeriesPoint;

/// Which rows of an indicator are kept
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoFilter {
    /// Keep rows with this geography id
    GeoId(i64),
    /// Keep rows whose geography name matches, ignoring case
    GeoName(String),
}

impl GeoFilter {
    pub fn keeps(&self, geo_id: Option<i64>, geo_name: Option<&str>) -> bool {
        match self {
            GeoFilter::GeoId(id) => geo_id == Some(*id),
            GeoFilter::GeoName(name) => {
                geo_name.is_some_and(|geo_name| geo_name.trim().eq_ignore_ascii_case(name.trim()))
            }
        }
    }
}

/// A price series of the feed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Indicator {
    pub id: u32,
    /// Measurement the rows are written to
    pub measurement: String,
    pub geo: GeoFilter,
}

/// Surplus sale price, country level
pub const SURPLUS_INDICATOR: u32 = 1739;

/// Regulated consumer price, one subregion
pub const PVPC_INDICATOR: u32 = 1001;

/// Geography id of the country level
pub const COUNTRY_GEO_ID: i64 = 3;

pub fn default_indicators() -> Vec<Indicator> {
    vec![
        Indicator {
            id: SURPLUS_INDICATOR,
            measurement: String::from("mwh_pvpc_venta_excedente"),
            geo: GeoFilter::GeoId(COUNTRY_GEO_ID),
        },
        Indicator {
            id: PVPC_INDICATOR,
            measurement: String::from("mwh_pvpc"),
            geo: GeoFilter::GeoName(String::from("Canarias")),
        },
    ]
}

/// Inclusive range of days queried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The day after `today`, for both ends
    pub fn tomorrow(today: NaiveDate) -> Self {
        let tomorrow = today.checked_add_days(Days::new(1)).unwrap_or(today);
        Self {
            start: tomorrow,
            end: tomorrow,
        }
    }

    /// Fill in missing bounds; with none given, query tomorrow
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Self {
        match (start, end) {
            (Some(start), Some(end)) => Self { start, end },
            (Some(day), None) | (None, Some(day)) => Self {
                start: day,
                end: day,
            },
            (None, None) => Self::tomorrow(today),
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} .. {}", self.start, self.end)
    }
}

#[derive(Debug)]
pub enum FeedError {
    /// No indicator produced a single point for the range
    NoData { range: DateRange },
}

impl fmt::Display for FeedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedError::NoData { range } => write!(f, "no data available for {range}"),
        }
    }
}

impl std::error::Error for FeedError {}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    indicator: Option<FeedIndicator>,
}

#[derive(Debug, Deserialize)]
struct FeedIndicator {
    #[serde(default)]
    values: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct FeedValue {
    geo_id: Option<i64>,
    geo_name: Option<String>,
    datetime_utc: Option<String>,
    value: Option<f64>,
}

/// Reshape a response body into points; anything unreadable yields nothing
fn parse_points(indicator: &Indicator, body: &str) -> Vec<TimeSeriesPoint> {
    let response = match serde_json::from_str::<FeedResponse>(body) {
        Ok(response) => response,
        Err(e) => {
            warn!(indicator = indicator.id, "could not parse response body: {e}");
            return vec![];
        }
    };

    let values = response
        .indicator
        .and_then(|indicator| indicator.values)
        .unwrap_or_default();

    values
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<FeedValue>(row) {
            Ok(row) => Some(row),
            Err(e) => {
                debug!(indicator = indicator.id, "skipping unreadable row: {e}");
                None
            }
        })
        .filter(|row| indicator.geo.keeps(row.geo_id, row.geo_name.as_deref()))
        .filter_map(|row| {
            let time = row
                .datetime_utc
                .as_deref()
                .and_then(|time| DateTime::parse_from_rfc3339(time).ok())?
                .with_timezone(&Utc);
            let value = row.value?;

            Some(
                TimeSeriesPoint::new(&indicator.measurement)
                    .with_tag("geo_name", row.geo_name.unwrap_or_default())
                    .with_field("value", value)
                    .at(time),
            )
        })
        .collect()
}

pub struct PriceFeedFetcher {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl PriceFeedFetcher {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, indicator: &Indicator, range: &DateRange) -> String {
        format!(
            "{}/indicators/{}?start_date={}T00:00&end_date={}T23:59&group_by=hour",
            self.base_url,
            indicator.id,
            range.start.format("%d-%m-%Y"),
            range.end.format("%d-%m-%Y"),
        )
    }

    /// Fetch every indicator for the range (tomorrow when not given)
    #[instrument(skip_all)]
    pub async fn fetch(
        &self,
        indicators: &[Indicator],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Vec<TimeSeriesPoint>, FeedError> {
        let range = DateRange::resolve(start, end, Local::now().date_naive());
        self.fetch_range(indicators, range).await
    }

    pub async fn fetch_range(
        &self,
        indicators: &[Indicator],
        range: DateRange,
    ) -> Result<Vec<TimeSeriesPoint>, FeedError> {
        let mut points = vec![];

        for indicator in indicators {
            points.extend(self.fetch_indicator(indicator, &range).await);
        }

        if points.is_empty() {
            error!("no data available for {range}");
            return Err(FeedError::NoData { range });
        }

        Ok(points)
    }

    async fn fetch_indicator(&self, indicator: &Indicator, range: &DateRange) -> Vec<TimeSeriesPoint> {
        let url = self.url(indicator, range);
        info!("requesting {url}");

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json; application/vnd.esios-api-v2+json")
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.token)
            .header("Cache-Control", "no-cache")
            .header("Pragma", "no-cache")
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                error!(indicator = indicator.id, "error during request: {e}");
                return vec![];
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(indicator = indicator.id, "request succeeded: {status}");
        } else {
            error!(indicator = indicator.id, "request failed: {status}");
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                error!(indicator = indicator.id, "error during decode: {e}");
                return vec![];
            }
        };

        let points = parse_points(indicator, &body);
        debug!(indicator = indicator.id, "{} points", points.len());
        points
    }
}
