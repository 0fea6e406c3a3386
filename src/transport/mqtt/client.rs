//! rumqttc-backed broker transport
//!
//! Each `connect` builds a fresh `AsyncClient`/`EventLoop` pair and spawns a
//! task that polls the event loop. The task first waits for ConnAck under the
//! connect timeout and reports the outcome, then forwards inbound publishes
//! until the connection drops or the transport is closed. It never
//! reconnects: after reporting a loss it exits and waits for the owner to
//! call `connect` again.

use super::connection::{REQUEST_CHANNEL_CAPACITY, configure_mqtt_options};
use super::message_handler::{EventRoute, MessageHandler};
use crate::transport::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, QoS, TransportError, TransportEventSink,
};
use async_trait::async_trait;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Grace period for the event loop task to exit on close
const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Lifecycle signal from the transport to its event loop task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopControl {
    Run,
    /// A clean disconnect was requested; keep polling until it is flushed
    Disconnecting,
    Shutdown,
}

/// MQTT v5 transport on rumqttc
#[derive(Default)]
pub struct RumqttcTransport {
    session: Option<ActiveSession>,
}

struct ActiveSession {
    client: AsyncClient,
    control_tx: watch::Sender<LoopControl>,
    handle: JoinHandle<()>,
}

impl RumqttcTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&self) -> Result<&AsyncClient, TransportError> {
        self.session
            .as_ref()
            .map(|session| &session.client)
            .ok_or(TransportError::NotConnected)
    }

    /// Wait for ConnAck, skipping anything polled before it
    async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), String> {
        loop {
            match event_loop.poll().await {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged => return Ok(()),
                    EventRoute::ConnectionRefused(code) => {
                        return Err(format!("Broker refused connection: {code}"));
                    }
                    route => debug!(target: "mqtt_transport", ?route, "Event before ConnAck"),
                },
                Err(e) => return Err(e.to_string()),
            }
        }
    }

    async fn drive_event_loop(
        mut event_loop: EventLoop,
        sink: TransportEventSink,
        connect_timeout: Duration,
        mut control_rx: watch::Receiver<LoopControl>,
    ) {
        let connack = tokio::select! {
            _ = control_rx.changed() => {
                debug!(target: "mqtt_transport", "Closed while connecting");
                return;
            }
            result = tokio::time::timeout(connect_timeout, Self::wait_for_connack(&mut event_loop)) => result,
        };

        match connack {
            Ok(Ok(())) => {
                sink.connect_succeeded();
            }
            Ok(Err(cause)) => {
                sink.connect_failed(cause);
                return;
            }
            Err(_) => {
                sink.connect_failed(format!(
                    "No ConnAck within {}s",
                    connect_timeout.as_secs()
                ));
                return;
            }
        }

        loop {
            tokio::select! {
                changed = control_rx.changed() => {
                    if changed.is_err() || *control_rx.borrow() == LoopControl::Shutdown {
                        break;
                    }
                }
                polled = event_loop.poll() => match polled {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::MessageReceived { topic, payload } => {
                            debug!(target: "mqtt_transport", topic = %topic, bytes = payload.len(), "Received publish");
                            if !sink.message_arrived(topic, payload) {
                                break;
                            }
                        }
                        EventRoute::Disconnected(reason) => {
                            warn!(reason = %reason, "Broker closed the connection");
                            sink.connection_lost(format!("Broker disconnected: {reason}"));
                            break;
                        }
                        EventRoute::ConnectionAcknowledged | EventRoute::ConnectionRefused(_) => {}
                        EventRoute::InfrastructureEvent(event) => {
                            debug!(target: "mqtt_transport", event = %event, "MQTT event");
                        }
                        EventRoute::DisconnectSent => break,
                        EventRoute::OutgoingEvent => {}
                    },
                    Err(e) => {
                        if *control_rx.borrow() == LoopControl::Run {
                            sink.connection_lost(e.to_string());
                        }
                        break;
                    }
                }
            }
        }

        debug!(target: "mqtt_transport", epoch = sink.epoch(), "Event loop task stopped");
    }

    async fn shutdown_session(session: ActiveSession) {
        let _ = session.control_tx.send(LoopControl::Shutdown);
        drop(session.client);

        let mut handle = session.handle;
        match tokio::time::timeout(CLOSE_GRACE_PERIOD, &mut handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop task didn't shut down gracefully, forcing abort");
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl BrokerTransport for RumqttcTransport {
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        options: ConnectOptions,
        sink: TransportEventSink,
    ) -> Result<(), TransportError> {
        if let Some(previous) = self.session.take() {
            Self::shutdown_session(previous).await;
        }

        let mqtt_options = configure_mqtt_options(endpoint, &options);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CHANNEL_CAPACITY);
        let (control_tx, control_rx) = watch::channel(LoopControl::Run);

        info!(
            broker = %endpoint,
            client_id = %options.client_id,
            "Connecting to MQTT broker"
        );

        let handle = tokio::spawn(Self::drive_event_loop(
            event_loop,
            sink,
            options.connect_timeout,
            control_rx,
        ));

        self.session = Some(ActiveSession {
            client,
            control_tx,
            handle,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.client()?
            .subscribe(topic, qos)
            .await
            .map_err(|e| TransportError::SubscriptionFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        qos: QoS,
        retained: bool,
    ) -> Result<(), TransportError> {
        self.client()?
            .publish(topic, qos, retained, payload)
            .await
            .map_err(|e| TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let session = self.session.as_ref().ok_or(TransportError::NotConnected)?;
        // Flag first so the loop doesn't report our own disconnect as a loss
        let _ = session.control_tx.send(LoopControl::Disconnecting);
        session
            .client
            .disconnect()
            .await
            .map_err(|e| TransportError::DisconnectFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if let Some(session) = self.session.take() {
            Self::shutdown_session(session).await;
            info!("MQTT transport closed");
        }
        Ok(())
    }
}
