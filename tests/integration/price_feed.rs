//! Price feed against a mocked HTTP API

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use gridwatch::monitors::prices::{FeedError, PriceFeedFetcher, default_indicators};
use pretty_assertions::assert_eq;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).unwrap()
}

fn fetcher(server: &MockServer) -> PriceFeedFetcher {
    PriceFeedFetcher::new(server.uri(), "secret", Duration::from_secs(5)).unwrap()
}

fn surplus_body() -> serde_json::Value {
    serde_json::json!({
        "indicator": {
            "name": "surplus",
            "values": [
                { "geo_id": 3, "geo_name": "España", "datetime_utc": "2026-10-16T22:00:00Z", "value": 52.1 },
                { "geo_id": 3, "geo_name": "España", "datetime_utc": "2026-10-16T23:00:00Z", "value": 49.7 },
                { "geo_id": 8741, "geo_name": "Península", "datetime_utc": "2026-10-16T22:00:00Z", "value": 80.0 }
            ]
        }
    })
}

fn pvpc_body() -> serde_json::Value {
    serde_json::json!({
        "indicator": {
            "values": [
                { "geo_id": 8742, "geo_name": "canarias", "datetime_utc": "2026-10-16T22:00:00Z", "value": 140.25 },
                { "geo_id": 8741, "geo_name": "Península", "datetime_utc": "2026-10-16T22:00:00Z", "value": 150.0 }
            ]
        }
    })
}

#[tokio::test]
async fn test_fetch_filters_and_reshapes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/indicators/1739"))
        .and(query_param("start_date", "17-10-2026T00:00"))
        .and(query_param("end_date", "17-10-2026T23:59"))
        .and(query_param("group_by", "hour"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(surplus_body()))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/indicators/1001"))
        .and(header("x-api-key", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pvpc_body()))
        .expect(1)
        .mount(&server)
        .await;

    let points = fetcher(&server)
        .fetch(&default_indicators(), Some(day()), None)
        .await
        .unwrap();

    assert_eq!(points.len(), 3);
    assert!(
        points[..2]
            .iter()
            .all(|point| point.measurement == "mwh_pvpc_venta_excedente")
    );
    assert_eq!(points[0].fields["value"], 52.1);
    assert_eq!(points[2].measurement, "mwh_pvpc");
    assert_eq!(points[2].tags["geo_name"], "canarias");
    assert_eq!(points[2].fields["value"], 140.25);
}

#[tokio::test]
async fn test_error_status_does_not_abort_batch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/indicators/1739"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/indicators/1001"))
        .respond_with(ResponseTemplate::new(200).set_body_json(pvpc_body()))
        .mount(&server)
        .await;

    let points = fetcher(&server)
        .fetch(&default_indicators(), Some(day()), Some(day()))
        .await
        .unwrap();

    assert_eq!(points.len(), 1);
    assert_eq!(points[0].measurement, "mwh_pvpc");
}

#[tokio::test]
async fn test_no_published_data_is_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "indicator": { "values": [] } })),
        )
        .mount(&server)
        .await;

    let result = fetcher(&server)
        .fetch(&default_indicators(), Some(day()), Some(day()))
        .await;

    assert_matches!(result, Err(FeedError::NoData { range }) if range.start == day());
}

#[tokio::test]
async fn test_unreachable_feed_is_a_failure() {
    let fetcher =
        PriceFeedFetcher::new("http://127.0.0.1:9", "secret", Duration::from_millis(500)).unwrap();

    let result = fetcher
        .fetch(&default_indicators(), Some(day()), Some(day()))
        .await;

    assert_matches!(result, Err(FeedError::NoData { .. }));
}
