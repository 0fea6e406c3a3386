//! Broker transport abstraction
//!
//! The session manager owns exactly one transport and drives it through
//! [`BrokerTransport`]. Connect outcomes, connection loss and inbound
//! publishes are reported asynchronously through a [`TransportEventSink`]
//! stamped with the epoch of the connect call that created it, so events
//! from a torn-down connection can be told apart from current ones.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;

pub mod mqtt;

pub use mqtt::RumqttcTransport;
pub use rumqttc::v5::mqttbytes::QoS;

/// Transport-level errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("Not connected to broker")]
    NotConnected,
    #[error("Publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },
    #[error("Subscribe to {topic} failed: {reason}")]
    SubscriptionFailed { topic: String, reason: String },
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(String),
    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Broker host and port
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerEndpoint {
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port`, `host` (port 1883) or an `mqtt://host:port` URL
    pub fn parse(input: &str) -> Result<Self, TransportError> {
        let invalid = || TransportError::InvalidEndpoint(input.to_string());
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        if trimmed.contains("://") {
            let url = Url::parse(trimmed).map_err(|_| invalid())?;
            let host = url.host_str().filter(|h| !h.is_empty()).ok_or_else(invalid)?;
            let port = url
                .port()
                .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });
            return Ok(Self::new(host, port));
        }

        match trimmed.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() => {
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                Ok(Self::new(host, port))
            }
            Some(_) => Err(invalid()),
            None => Ok(Self::new(trimmed, 1883)),
        }
    }
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Message the broker publishes on our behalf if the connection drops uncleanly
#[derive(Debug, Clone, PartialEq)]
pub struct LastWillMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retained: bool,
}

/// Per-connect options
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectOptions {
    pub client_id: String,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub clean_session: bool,
    /// Always false for the session manager, which owns reconnect policy
    pub automatic_reconnect: bool,
    pub last_will: Option<LastWillMessage>,
    /// `(username, password)`
    pub credentials: Option<(String, String)>,
    pub tls: bool,
}

impl ConnectOptions {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(30),
            clean_session: true,
            automatic_reconnect: false,
            last_will: None,
            credentials: None,
            tls: false,
        }
    }
}

/// Outcome of an asynchronous connect
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectResult {
    Success,
    Failure(String),
}

/// Publish received on a subscribed topic
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Events a transport reports back to its owner
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connect(ConnectResult),
    ConnectionLost(String),
    MessageArrived(InboundMessage),
}

/// Epoch-stamped sender handed to the transport on each connect
#[derive(Debug, Clone)]
pub struct TransportEventSink {
    epoch: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl TransportEventSink {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns false once the owner has gone away
    pub fn send(&self, event: TransportEvent) -> bool {
        self.tx.send((self.epoch, event)).is_ok()
    }

    pub fn connect_succeeded(&self) -> bool {
        self.send(TransportEvent::Connect(ConnectResult::Success))
    }

    pub fn connect_failed(&self, cause: impl Into<String>) -> bool {
        self.send(TransportEvent::Connect(ConnectResult::Failure(cause.into())))
    }

    pub fn connection_lost(&self, cause: impl Into<String>) -> bool {
        self.send(TransportEvent::ConnectionLost(cause.into()))
    }

    pub fn message_arrived(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> bool {
        self.send(TransportEvent::MessageArrived(InboundMessage::new(
            topic, payload,
        )))
    }
}

/// Broker transport capability
///
/// `connect` only initiates the connection; its outcome arrives later on the
/// sink as [`TransportEvent::Connect`]. Implementations must never reconnect
/// on their own.
#[async_trait::async_trait]
pub trait BrokerTransport: Send + 'static {
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        options: ConnectOptions,
        sink: TransportEventSink,
    ) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retained: bool,
    ) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Release all connection resources; safe to call repeatedly
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(
            BrokerEndpoint::new("broker.emqx.io", 1883).to_string(),
            "broker.emqx.io:1883"
        );
    }

    #[test]
    fn test_endpoint_parse_forms() {
        assert_eq!(
            BrokerEndpoint::parse("10.0.0.5:1884").unwrap(),
            BrokerEndpoint::new("10.0.0.5", 1884)
        );
        assert_eq!(
            BrokerEndpoint::parse("mqtt.local").unwrap(),
            BrokerEndpoint::new("mqtt.local", 1883)
        );
        assert_eq!(
            BrokerEndpoint::parse("mqtt://broker.example.com:2883").unwrap(),
            BrokerEndpoint::new("broker.example.com", 2883)
        );
        assert_eq!(
            BrokerEndpoint::parse("mqtts://broker.example.com").unwrap(),
            BrokerEndpoint::new("broker.example.com", 8883)
        );
    }

    #[test]
    fn test_endpoint_parse_rejects_garbage() {
        for input in ["", "   ", ":1883", "host:notaport", "host:70000"] {
            assert!(
                matches!(
                    BrokerEndpoint::parse(input),
                    Err(TransportError::InvalidEndpoint(_))
                ),
                "accepted {input:?}"
            );
        }
    }

    #[test]
    fn test_connect_options_defaults() {
        let options = ConnectOptions::new("android_screen_abc");
        assert!(options.clean_session);
        assert!(!options.automatic_reconnect);
        assert_eq!(options.keep_alive, Duration::from_secs(60));
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert!(options.last_will.is_none());
    }

    #[test]
    fn test_sink_stamps_epoch() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = TransportEventSink::new(7, tx);

        assert!(sink.connect_succeeded());
        assert!(sink.message_arrived("a/b", b"hi".to_vec()));

        assert_eq!(
            rx.try_recv().unwrap(),
            (7, TransportEvent::Connect(ConnectResult::Success))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            (7, TransportEvent::MessageArrived(InboundMessage::new("a/b", "hi")))
        );
    }

    #[test]
    fn test_sink_reports_closed_owner() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = TransportEventSink::new(1, tx);
        drop(rx);
        assert!(!sink.connection_lost("gone"));
    }
}
