//! InfluxDB 1.x HTTP backend
//!
//! Talks to the `/ping`, `/query` and `/write` endpoints and encodes points
//! in line protocol.

use std::fmt::Write;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::backend::{SinkClient, SinkConnector, TimePrecision};
use super::error::{SinkError, SinkResult};
use crate::point::TimeSeriesPoint;

/// Opens connections to an InfluxDB server
#[derive(Debug, Clone)]
pub struct InfluxConnector {
    url: String,
    timeout: Duration,
    credentials: Option<(String, String)>,
}

impl InfluxConnector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            timeout,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((username.into(), password.into()));
        self
    }
}

#[async_trait]
impl SinkConnector for InfluxConnector {
    async fn connect(&self) -> SinkResult<Box<dyn SinkClient>> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| SinkError::Unreachable(format!("could not build HTTP client: {e}")))?;

        let url = format!("{}/ping", self.url);
        trace!("pinging {url}");

        let response = client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(SinkError::Unreachable(format!(
                "ping answered with {}",
                response.status()
            )));
        }

        debug!("connected to {}", self.url);

        Ok(Box::new(InfluxClient {
            client: Some(client),
            url: self.url.clone(),
            credentials: self.credentials.clone(),
            database: None,
        }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Connection handle to an InfluxDB server
pub struct InfluxClient {
    client: Option<reqwest::Client>,
    url: String,
    credentials: Option<(String, String)>,
    database: Option<String>,
}

impl InfluxClient {
    fn request(&self, method: reqwest::Method, endpoint: &str) -> SinkResult<reqwest::RequestBuilder> {
        let client = self.client.as_ref().ok_or(SinkError::Closed)?;
        let mut request = client.request(method, format!("{}/{endpoint}", self.url));

        if let Some((username, password)) = &self.credentials {
            request = request.basic_auth(username, Some(password));
        }

        Ok(request)
    }
}

async fn check_response(response: reqwest::Response) -> SinkResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    let message = response.text().await.unwrap_or_default();
    Err(SinkError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl SinkClient for InfluxClient {
    async fn create_database(&mut self, name: &str) -> SinkResult<()> {
        // CREATE DATABASE is a no-op when the database exists
        let statement = format!("CREATE DATABASE \"{}\"", name.replace('"', "\\\""));
        let response = self
            .request(reqwest::Method::POST, "query")?
            .query(&[("q", statement.as_str())])
            .send()
            .await?;

        check_response(response).await
    }

    async fn switch_database(&mut self, name: &str) -> SinkResult<()> {
        self.database = Some(name.to_string());
        Ok(())
    }

    async fn write_points(
        &mut self,
        points: &[TimeSeriesPoint],
        precision: TimePrecision,
    ) -> SinkResult<()> {
        let database = self.database.clone().ok_or(SinkError::NoDatabase)?;

        let mut body = String::new();
        for point in points {
            body.push_str(&encode_line(point, precision));
            body.push('\n');
        }

        let response = self
            .request(reqwest::Method::POST, "write")?
            .query(&[("db", database.as_str()), ("precision", precision.as_code())])
            .body(body)
            .send()
            .await?;

        check_response(response).await
    }

    async fn close(&mut self) -> SinkResult<()> {
        self.client = None;
        Ok(())
    }
}

fn escape(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn escape_measurement(value: &str) -> String {
    escape(value, &[',', ' '])
}

fn escape_key(value: &str) -> String {
    escape(value, &[',', '=', ' '])
}

/// Encode a point as one line of line protocol
pub fn encode_line(point: &TimeSeriesPoint, precision: TimePrecision) -> String {
    let mut line = escape_measurement(&point.measurement);

    for (key, value) in &point.tags {
        if value.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(key), escape_key(value));
    }

    let fields = point
        .fields
        .iter()
        .map(|(key, value)| format!("{}={value}", escape_key(key)))
        .collect::<Vec<_>>()
        .join(",");
    line.push(' ');
    line.push_str(&fields);

    if let Some(time) = point.time {
        let timestamp = match precision {
            TimePrecision::Seconds => time.timestamp(),
            TimePrecision::Milliseconds => time.timestamp_millis(),
        };
        let _ = write!(line, " {timestamp}");
    }

    line
}
