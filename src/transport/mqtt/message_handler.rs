//! Pure routing of rumqttc events

use rumqttc::Outgoing;
use rumqttc::v5::Event;
use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet};

/// Pure event routing decisions
pub struct MessageHandler;

impl MessageHandler {
    /// Classify a polled event
    pub fn route_mqtt_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => match connack.code {
                    ConnectReturnCode::Success => EventRoute::ConnectionAcknowledged,
                    code => EventRoute::ConnectionRefused(format!("{code:?}")),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::Disconnected(format!("{:?}", disconnect.reason_code))
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(Outgoing::Disconnect) => EventRoute::DisconnectSent,
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }
}

/// Routing decisions for rumqttc events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    ConnectionAcknowledged,
    /// ConnAck carried a failure code
    ConnectionRefused(String),
    MessageReceived { topic: String, payload: Vec<u8> },
    /// Broker-initiated disconnect with its reason code
    Disconnected(String),
    /// PingResp, SubAck, PubAck and friends
    InfrastructureEvent(String),
    /// Our own Disconnect packet went out
    DisconnectSent,
    OutgoingEvent,
}
