//! Message bus subscriber
//!
//! A pump task polls the broker connection and forwards events into a
//! bounded queue without ever waiting on the writer. The writer normalizes
//! each message into a point and writes it immediately.
//!
//! ```text
//! broker ──poll──> pump ──try_send──> queue ──> process_events ──> sink
//!                   │                               │
//!                   └── error: Disconnected ────────┴──> SessionEnd
//! ```

use std::fmt;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS,
    SubscribeReasonCode,
};
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use super::connect_or_shutdown;
use crate::config::BusConfig;
use crate::point::{TimeSeriesPoint, round1};
use crate::sink::{ResilientSink, SinkError, SinkHandle};
use crate::util::Shutdown;

/// Tag carrying the second topic segment
pub const SENSOR_TAG: &str = "sensor";

/// What the pump reports to the writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Connected,
    Message { topic: String, payload: Vec<u8> },
    Disconnected { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Payload is not valid UTF-8
    Encoding,
    /// Payload is not JSON
    Json(String),
    /// Payload is JSON but not an object
    NotAnObject,
    /// Topic has fewer than two segments
    Topic(String),
    /// A member cannot be read as a number
    Field(String),
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::Encoding => write!(f, "payload is not valid UTF-8"),
            MessageError::Json(e) => write!(f, "payload is not valid JSON: {e}"),
            MessageError::NotAnObject => write!(f, "payload is not a JSON object"),
            MessageError::Topic(topic) => {
                write!(f, "topic '{topic}' has fewer than two segments")
            }
            MessageError::Field(name) => write!(f, "member '{name}' is not numeric"),
        }
    }
}

impl std::error::Error for MessageError {}

/// Map a numeric QoS level, clamping unknown levels to at-most-once
pub fn qos_from_u8(level: u8) -> QoS {
    match level {
        1 => QoS::AtLeastOnce,
        2 => QoS::ExactlyOnce,
        _ => QoS::AtMostOnce,
    }
}

fn coerce(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        _ => None,
    }?;

    number.is_finite().then(|| round1(number))
}

/// Turn a bus message into a point
///
/// The first topic segment is the measurement and the second becomes the
/// `sensor` tag. Every member must be a number, a numeric string or a bool;
/// one that is not rejects the whole message. An empty object yields a point
/// that fails validation.
pub fn normalize_message(topic: &str, payload: &[u8]) -> Result<TimeSeriesPoint, MessageError> {
    let mut segments = topic.split('/').map(str::trim);
    let (Some(measurement), Some(sensor)) = (segments.next(), segments.next()) else {
        return Err(MessageError::Topic(topic.to_string()));
    };
    if measurement.is_empty() || sensor.is_empty() {
        return Err(MessageError::Topic(topic.to_string()));
    }

    let text = std::str::from_utf8(payload).map_err(|_| MessageError::Encoding)?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| MessageError::Json(e.to_string()))?;
    let Value::Object(members) = value else {
        return Err(MessageError::NotAnObject);
    };

    let fields = members
        .iter()
        .map(|(name, value)| {
            coerce(value)
                .map(|number| (name.clone(), number))
                .ok_or_else(|| MessageError::Field(name.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TimeSeriesPoint::new(measurement)
        .with_tag(SENSOR_TAG, sensor)
        .with_fields(fields))
}

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    BrokerDisconnected,
    Shutdown,
}

/// Consume bus events until the broker goes away or shutdown is requested
///
/// The handle is replaced in place when the sink reports a connectivity
/// failure.
pub async fn process_events(
    events: &mut mpsc::Receiver<BusEvent>,
    sink: &ResilientSink,
    handle: &mut SinkHandle,
    shutdown: &mut Shutdown,
) -> SessionEnd {
    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = shutdown.wait() => return SessionEnd::Shutdown,
        };

        let (topic, payload) = match event {
            Some(BusEvent::Message { topic, payload }) => (topic, payload),
            Some(BusEvent::Connected) => {
                info!("connected to broker");
                continue;
            }
            Some(BusEvent::Disconnected { reason }) => {
                error!("disconnected from broker: {reason}");
                return SessionEnd::BrokerDisconnected;
            }
            None => {
                error!("broker event loop stopped");
                return SessionEnd::BrokerDisconnected;
            }
        };

        trace!("{topic}: {} bytes", payload.len());

        let point = match normalize_message(&topic, &payload) {
            Ok(point) => point,
            Err(e) => {
                warn!("{topic}: dropping message: {e}");
                continue;
            }
        };

        match sink.write(handle, std::slice::from_ref(&point), false).await {
            Ok(()) => {}
            Err(e) if e.is_connectivity() => {
                error!("error with the time-series store: {e}");
                let _ = handle.close().await;
                match connect_or_shutdown(sink, shutdown).await {
                    Some(fresh) => *handle = fresh,
                    None => return SessionEnd::Shutdown,
                }
            }
            Err(SinkError::InvalidPoint(e)) => warn!("{topic}: dropping message: {e}"),
            Err(e) => error!("{topic}: could not write message: {e}"),
        }
    }
}

async fn pump(mut event_loop: EventLoop, events: mpsc::Sender<BusEvent>) {
    loop {
        let event = match event_loop.poll().await {
            Ok(event) => event,
            Err(e) => {
                let _ = events
                    .send(BusEvent::Disconnected {
                        reason: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let forwarded = match event {
            Event::Incoming(Packet::ConnAck(ack)) if ack.code == ConnectReturnCode::Success => {
                BusEvent::Connected
            }
            Event::Incoming(Packet::ConnAck(ack)) => {
                let _ = events
                    .send(BusEvent::Disconnected {
                        reason: format!("connection refused: {:?}", ack.code),
                    })
                    .await;
                return;
            }
            Event::Incoming(Packet::SubAck(ack)) => {
                for code in &ack.return_codes {
                    match code {
                        SubscribeReasonCode::Success(qos) => {
                            debug!("subscription {} granted with {qos:?}", ack.pkid)
                        }
                        SubscribeReasonCode::Failure => {
                            error!("subscription {} rejected by broker", ack.pkid)
                        }
                    }
                }
                continue;
            }
            Event::Incoming(Packet::Publish(publish)) => BusEvent::Message {
                topic: publish.topic,
                payload: publish.payload.to_vec(),
            },
            Event::Incoming(Packet::Disconnect) => {
                let _ = events
                    .send(BusEvent::Disconnected {
                        reason: String::from("broker closed the session"),
                    })
                    .await;
                return;
            }
            _ => continue,
        };

        match events.try_send(forwarded) {
            Ok(()) => {}
            Err(TrySendError::Full(BusEvent::Message { topic, .. })) => {
                warn!("{topic}: queue full, dropping message")
            }
            Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => return,
        }
    }
}

/// One broker session
pub struct BusSubscriber {
    client: AsyncClient,
    events: mpsc::Receiver<BusEvent>,
    pump: JoinHandle<()>,
}

impl BusSubscriber {
    /// Set up the client and start polling the broker
    pub fn connect(config: &BusConfig) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive.max(5)));
        options.set_clean_session(true);

        let capacity = config.queue_capacity.max(1);
        let (client, event_loop) = AsyncClient::new(options, capacity);
        let (tx, events) = mpsc::channel(capacity);
        let pump = tokio::spawn(pump(event_loop, tx));

        info!("connecting to {}:{}", config.broker, config.port);

        Self {
            client,
            events,
            pump,
        }
    }

    /// Request every topic once; returns how many requests were accepted
    pub async fn subscribe(&self, topics: &[String], qos: QoS) -> usize {
        let mut accepted = 0;

        for topic in topics.iter().map(|topic| topic.trim()) {
            if topic.is_empty() {
                continue;
            }

            match self.client.subscribe(topic, qos).await {
                Ok(()) => {
                    info!("subscribed to {topic}");
                    accepted += 1;
                }
                Err(e) => error!("could not subscribe to {topic}: {e}"),
            }
        }

        accepted
    }

    /// Forward messages until the session ends, then tear it down
    pub async fn run(
        mut self,
        sink: &ResilientSink,
        handle: &mut SinkHandle,
        shutdown: &mut Shutdown,
    ) -> SessionEnd {
        let end = process_events(&mut self.events, sink, handle, shutdown).await;

        self.pump.abort();
        if let Err(e) = self.client.try_disconnect() {
            debug!("disconnect: {e}");
        }

        end
    }
}

/// Keep a broker session alive until shutdown, starting over after each
/// disconnect
#[instrument(skip_all, fields(broker = %config.broker))]
pub async fn run_subscriber(config: BusConfig, sink: ResilientSink, mut shutdown: Shutdown) {
    let pause = Duration::from_secs(config.timeout);
    let qos = qos_from_u8(config.qos);

    let Some(mut handle) = connect_or_shutdown(&sink, &mut shutdown).await else {
        return;
    };

    loop {
        let subscriber = BusSubscriber::connect(&config);
        subscriber.subscribe(&config.topics, qos).await;

        match subscriber.run(&sink, &mut handle, &mut shutdown).await {
            SessionEnd::Shutdown => break,
            SessionEnd::BrokerDisconnected => {
                info!("reconnecting to broker in {}s", pause.as_secs());
                if !shutdown.sleep(pause).await {
                    break;
                }
            }
        }
    }

    debug!("stopping");
    let _ = handle.close().await;
}
