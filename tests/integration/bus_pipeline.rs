//! Bus events flowing into the store

use gridwatch::monitors::bus::{BusEvent, SessionEnd, process_events};
use gridwatch::util::shutdown_channel;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

use crate::helpers::memory_sink;

fn message(topic: &str, payload: &[u8]) -> BusEvent {
    BusEvent::Message {
        topic: topic.to_string(),
        payload: payload.to_vec(),
    }
}

#[tokio::test]
async fn test_readings_from_several_sensors() {
    let (memory, sink) = memory_sink("mqtt");
    let mut handle = sink.connect_ready().await;
    let (_trigger, mut shutdown) = shutdown_channel();
    let (tx, mut rx) = mpsc::channel(16);

    tx.send(BusEvent::Connected).await.unwrap();
    tx.send(message("dht/kitchen", br#"{"temperatura": 29.78, "humedad": "48"}"#))
        .await
        .unwrap();
    tx.send(message("dht", br#"{"temperatura": 10}"#)).await.unwrap();
    tx.send(message("dht/garden", &[0xc3, 0x28])).await.unwrap();
    tx.send(message("dht/garden", br#"{"temperatura": 18.2, "estado": "n/a"}"#))
        .await
        .unwrap();
    tx.send(message("power/meter", br#"{"watts": "1523.46", "relay": true}"#))
        .await
        .unwrap();
    drop(tx);

    let end = process_events(&mut rx, &sink, &mut handle, &mut shutdown).await;
    assert_eq!(end, SessionEnd::BrokerDisconnected);

    let points = memory.points_in("mqtt");
    assert_eq!(points.len(), 2);

    assert_eq!(points[0].measurement, "dht");
    assert_eq!(points[0].tags["sensor"], "kitchen");
    assert_eq!(points[0].fields["temperatura"], 29.8);
    assert_eq!(points[0].fields["humedad"], 48.0);

    assert_eq!(points[1].measurement, "power");
    assert_eq!(points[1].tags["sensor"], "meter");
    assert_eq!(points[1].fields["watts"], 1523.5);
    assert_eq!(points[1].fields["relay"], 1.0);
}
