//! MQTT v5 transport built on rumqttc
//!
//! - [`connection`] - pure option building
//! - [`message_handler`] - pure event routing
//! - [`client`] - the event loop task and the [`crate::transport::BrokerTransport`] impl

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::RumqttcTransport;
pub use connection::configure_mqtt_options;
pub use message_handler::{EventRoute, MessageHandler};
