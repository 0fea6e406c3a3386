//! Display Client - Rust Implementation
//!
//! Device-side MQTT session client for networked display endpoints.
//!
//! # Overview
//!
//! A display connects to a cloud broker under a persistent device identity,
//! announces itself, keeps a heartbeat going, receives content pushes, remote
//! commands and broadcasts, and recovers from connection loss with bounded
//! backoff. This crate provides:
//! - The topic namespace and JSON payload records of the cloud contract
//! - A session actor owning connection state, heartbeat and reconnect timers
//! - Inbound routing with typed decoding and isolated application callbacks
//! - A `rumqttc` transport and pluggable config store / platform collaborators
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use display_client::callbacks::ClientCallbacks;
//! use display_client::client::DeviceClient;
//! use display_client::config::ClientConfig;
//! use display_client::platform::HostPlatform;
//! use display_client::protocol::ContentPush;
//! use display_client::store::FileConfigStore;
//! use display_client::transport::RumqttcTransport;
//! use std::sync::Arc;
//!
//! struct Player;
//!
//! impl ClientCallbacks for Player {
//!     fn on_content_received(&self, content: ContentPush) {
//!         println!("play {}", content.content.id);
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::default();
//! let store = Arc::new(FileConfigStore::open(&config.device.state_file)?);
//! let platform = Arc::new(HostPlatform::from_config(&config.device));
//!
//! let client = DeviceClient::new(&config, RumqttcTransport::new(), store, platform)?;
//! client.set_callbacks(Arc::new(Player));
//! client.start();
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod client;
pub mod config;
pub mod error;
pub mod observability;
pub mod platform;
pub mod protocol;
pub mod routing;
pub mod session;
pub mod store;
pub mod testing;
pub mod transport;

pub use callbacks::ClientCallbacks;
pub use client::DeviceClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use protocol::*;
pub use session::{ConnectionState, SessionStatus};
pub use transport::{BrokerEndpoint, BrokerTransport};
