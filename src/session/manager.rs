//! Session manager actor
//!
//! One task owns the transport, the connection state, the reconnect
//! controller and the heartbeat scheduler. Everything that can change them
//! (application commands, transport events, timer firings) arrives as a
//! message and is handled to completion before the next one, so no state is
//! ever shared or locked.
//!
//! Transport events carry the epoch of the connect that produced them. The
//! epoch is bumped on every connect and every stop, which makes late results
//! from an abandoned connection harmless.

use super::heartbeat::{HeartbeatScheduler, heartbeat_record};
use super::reconnect::{ReconnectController, ReconnectDecision, ReconnectPolicy};
use super::state::{ConnectionState, SessionStatus};
use super::timer::TimerEvent;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, sanitize_error_message};
use crate::observability::metrics;
use crate::platform::DevicePlatform;
use crate::protocol::{
    DEVICE_TYPE, DeviceIdentity, RegistrationRecord, StatusRecord, TopicSet, now_millis,
};
use crate::store::ConfigStore;
use crate::transport::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, ConnectResult, InboundMessage,
    LastWillMessage, QoS, TransportEvent, TransportEventSink,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

/// Requests from the facade
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Stop {
        done: oneshot::Sender<()>,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        retained: bool,
    },
    SendStatus {
        status: String,
        details: Option<String>,
    },
    ManualReconnect,
    UpdateBrokerConfig {
        endpoint: BrokerEndpoint,
        done: oneshot::Sender<()>,
    },
}

/// Notifications for the application-facing dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    /// Already sanitized
    Error(String),
    Message(InboundMessage),
}

/// Session parameters resolved from [`ClientConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Used when the store has no persisted endpoint
    pub default_endpoint: BrokerEndpoint,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
    pub tls: bool,
}

impl SessionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            default_endpoint: BrokerEndpoint::new(config.broker.host.clone(), config.broker.port),
            keep_alive: config.session.keep_alive(),
            connect_timeout: config.session.connect_timeout(),
            heartbeat_interval: config.session.heartbeat_interval(),
            reconnect: ReconnectPolicy {
                base_delay: config.session.reconnect_base_delay(),
                max_attempts: config.session.max_reconnect_attempts,
            },
            username_env: config.broker.username_env.clone(),
            password_env: config.broker.password_env.clone(),
            tls: config.broker.tls,
        }
    }

    /// Read credentials from the environment at connect time
    fn credentials(&self) -> Option<(String, String)> {
        let username = self
            .username_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())?;
        let password = self
            .password_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_default();
        Some((username, password))
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Collaborators and identity the session runs with
#[derive(Clone)]
pub struct SessionContext {
    pub identity: DeviceIdentity,
    pub topics: TopicSet,
    pub store: Arc<dyn ConfigStore>,
    pub platform: Arc<dyn DevicePlatform>,
    pub settings: SessionSettings,
}

/// Endpoint the next connect would use, without touching the store
pub fn stored_endpoint(store: &dyn ConfigStore, default: &BrokerEndpoint) -> BrokerEndpoint {
    let host = store
        .broker_host()
        .filter(|host| !host.trim().is_empty())
        .unwrap_or_else(|| default.host.clone());
    let port = store
        .broker_port()
        .filter(|port| *port != 0)
        .unwrap_or(default.port);
    BrokerEndpoint::new(host, port)
}

/// Like [`stored_endpoint`], writing the defaults back when nothing was persisted
fn resolve_endpoint(store: &dyn ConfigStore, default: &BrokerEndpoint) -> BrokerEndpoint {
    if store.broker_host().filter(|h| !h.trim().is_empty()).is_none() {
        if let Err(e) = store.set_broker_host(&default.host) {
            warn!(error = %e, "Failed to persist default broker host");
        }
    }
    if store.broker_port().filter(|p| *p != 0).is_none() {
        if let Err(e) = store.set_broker_port(default.port) {
            warn!(error = %e, "Failed to persist default broker port");
        }
    }
    stored_endpoint(store, default)
}

enum Step {
    Command(SessionCommand),
    Transport(u64, TransportEvent),
    Timer(TimerEvent),
}

pub struct SessionManager<T: BrokerTransport> {
    transport: T,
    ctx: SessionContext,
    state: ConnectionState,
    epoch: u64,
    reconnect: ReconnectController,
    heartbeat: HeartbeatScheduler,
    status_tx: watch::Sender<SessionStatus>,
    events: mpsc::UnboundedSender<SessionEvent>,
    transport_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    transport_rx: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    timer_tx: mpsc::UnboundedSender<TimerEvent>,
    timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
}

impl<T: BrokerTransport> SessionManager<T> {
    pub fn new(
        transport: T,
        ctx: SessionContext,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, watch::Receiver<SessionStatus>) {
        let (status_tx, status_rx) = watch::channel(SessionStatus::default());
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();

        let manager = Self {
            transport,
            reconnect: ReconnectController::new(ctx.settings.reconnect),
            heartbeat: HeartbeatScheduler::new(ctx.settings.heartbeat_interval),
            ctx,
            state: ConnectionState::Disconnected,
            epoch: 0,
            status_tx,
            events,
            transport_tx,
            transport_rx,
            timer_tx,
            timer_rx,
        };
        (manager, status_rx)
    }

    /// Process messages until every command sender is gone, then tear down
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        debug!(client_id = %self.ctx.identity.client_id(), "Session actor started");

        loop {
            let step = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => break,
                },
                Some((epoch, event)) = self.transport_rx.recv() => Step::Transport(epoch, event),
                Some(event) = self.timer_rx.recv() => Step::Timer(event),
            };

            match step {
                Step::Command(command) => self.handle_command(command).await,
                Step::Transport(epoch, event) => self.handle_transport_event(epoch, event).await,
                Step::Timer(event) => self.handle_timer(event).await,
            }
        }

        self.stop().await;
        debug!("Session actor stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Start => self.start().await,
            SessionCommand::Stop { done } => {
                self.stop().await;
                let _ = done.send(());
            }
            SessionCommand::Publish {
                topic,
                payload,
                retained,
            } => {
                self.publish(&topic, payload, retained).await;
            }
            SessionCommand::SendStatus { status, details } => {
                let record = StatusRecord::new(self.ctx.identity.device_id(), &status, details);
                let topic = self.ctx.topics.status.clone();
                self.publish_json(&topic, &record, false).await;
            }
            SessionCommand::ManualReconnect => {
                info!("Manual reconnect requested");
                self.reconnect.reset();
                self.start().await;
            }
            SessionCommand::UpdateBrokerConfig { endpoint, done } => {
                self.update_broker_config(endpoint).await;
                let _ = done.send(());
            }
        }
    }

    async fn handle_transport_event(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch {
            debug!(
                epoch = epoch,
                current = self.epoch,
                "Ignoring event from a previous connection"
            );
            return;
        }

        match event {
            TransportEvent::Connect(ConnectResult::Success) => self.on_connected().await,
            TransportEvent::Connect(ConnectResult::Failure(cause)) => {
                self.on_connect_failed(cause)
            }
            TransportEvent::ConnectionLost(cause) => self.on_connection_lost(cause),
            TransportEvent::MessageArrived(message) => {
                metrics().message_received();
                debug!(topic = %message.topic, bytes = message.payload.len(), "Message arrived");
                self.emit(SessionEvent::Message(message));
            }
        }
    }

    async fn handle_timer(&mut self, event: TimerEvent) {
        match event {
            TimerEvent::HeartbeatTick { generation } => {
                if !self.heartbeat.accepts(generation) {
                    debug!("Ignoring stale heartbeat tick");
                    return;
                }
                if self.state != ConnectionState::Connected {
                    return;
                }
                self.send_heartbeat().await;
            }
            TimerEvent::ReconnectDue { generation } => {
                if !self.reconnect.take_due(generation) {
                    debug!("Ignoring stale reconnect timer");
                    return;
                }
                info!(
                    attempt = self.reconnect.attempt_count(),
                    "Reconnect timer fired"
                );
                self.start().await;
            }
        }
    }

    async fn start(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "Start ignored");
            return;
        }

        // An explicit start supersedes any pending automatic attempt
        self.reconnect.cancel();

        let endpoint = resolve_endpoint(self.ctx.store.as_ref(), &self.ctx.settings.default_endpoint);
        let options = self.connect_options();

        self.epoch = self.epoch.wrapping_add(1);
        self.state = ConnectionState::Connecting;
        self.publish_status();
        metrics().connection_attempt();

        info!(
            broker = %endpoint,
            client_id = %options.client_id,
            failed_attempts = self.reconnect.attempt_count(),
            "Starting broker session"
        );

        let sink = TransportEventSink::new(self.epoch, self.transport_tx.clone());
        let span = crate::mqtt_span!(operation = "connect", broker = %endpoint);
        let result = self
            .transport
            .connect(&endpoint, options, sink)
            .instrument(span)
            .await;
        if let Err(e) = result {
            self.on_connect_failed(e.to_string());
        }
    }

    fn connect_options(&self) -> ConnectOptions {
        let mut options = ConnectOptions::new(self.ctx.identity.client_id());
        options.keep_alive = self.ctx.settings.keep_alive;
        options.connect_timeout = self.ctx.settings.connect_timeout;
        options.credentials = self.ctx.settings.credentials();
        options.tls = self.ctx.settings.tls;

        let will = StatusRecord::offline(self.ctx.identity.device_id());
        match serde_json::to_vec(&will) {
            Ok(payload) => {
                options.last_will = Some(LastWillMessage {
                    topic: self.ctx.topics.status.clone(),
                    payload,
                    qos: QoS::AtLeastOnce,
                    retained: false,
                });
            }
            Err(e) => warn!(error = %e, "Connecting without last will"),
        }
        options
    }

    async fn on_connected(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Unexpected connect success");
            return;
        }

        self.state = ConnectionState::Connected;
        self.reconnect.on_connected();
        metrics().connection_established();
        info!(client_id = %self.ctx.identity.client_id(), "Connected to broker");

        let subscriptions: Vec<String> = self
            .ctx
            .topics
            .subscriptions()
            .iter()
            .map(|topic| topic.to_string())
            .collect();
        for topic in subscriptions {
            match self.transport.subscribe(&topic, QoS::AtLeastOnce).await {
                Ok(()) => debug!(topic = %topic, "Subscribed"),
                Err(e) => {
                    error!(topic = %topic, error = %e, "Subscribe failed");
                    self.emit_error(e.to_string());
                }
            }
        }

        self.register().await;
        self.heartbeat.start(&self.timer_tx);
        self.publish_status();
        self.emit(SessionEvent::Connected);
    }

    fn on_connect_failed(&mut self, cause: String) {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "Unexpected connect failure");
            return;
        }

        self.state = ConnectionState::Disconnected;
        self.heartbeat.stop();
        metrics().connection_failed();
        warn!(cause = %cause, "Broker connect failed");
        self.emit_error(format!("Connect failed: {cause}"));
        self.schedule_reconnect();
    }

    fn on_connection_lost(&mut self, cause: String) {
        if self.state != ConnectionState::Connected {
            debug!(state = %self.state, "Connection loss while not connected");
            return;
        }

        self.state = ConnectionState::Disconnected;
        self.heartbeat.stop();
        metrics().connection_lost();
        warn!(cause = %cause, "Broker connection lost");
        self.emit(SessionEvent::Disconnected);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.reconnect.schedule_next(&self.timer_tx) {
            ReconnectDecision::Scheduled { .. } => metrics().reconnect_scheduled(),
            ReconnectDecision::Exhausted { attempts } => {
                metrics().reconnect_exhausted();
                self.emit_error(format!(
                    "Too many failed connection attempts ({attempts}); automatic reconnect stopped"
                ));
            }
        }
        self.publish_status();
    }

    async fn stop(&mut self) {
        self.heartbeat.stop();
        self.reconnect.cancel();

        if self.state == ConnectionState::Connected {
            let record = StatusRecord::new(
                self.ctx.identity.device_id(),
                "offline",
                Some("Service stopped".to_string()),
            );
            let topic = self.ctx.topics.status.clone();
            self.publish_json(&topic, &record, false).await;

            if let Err(e) = self.transport.disconnect().await {
                warn!(error = %e, "Disconnect failed");
            }
        }

        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "Transport close failed");
        }

        self.epoch = self.epoch.wrapping_add(1);
        if self.state != ConnectionState::Disconnected {
            info!("Broker session stopped");
        }
        self.state = ConnectionState::Disconnected;
        metrics().disconnected();
        self.publish_status();
    }

    async fn update_broker_config(&mut self, endpoint: BrokerEndpoint) {
        let persisted = self
            .ctx
            .store
            .set_broker_host(&endpoint.host)
            .and_then(|()| self.ctx.store.set_broker_port(endpoint.port));
        if let Err(e) = persisted {
            error!(error = %e, "Failed to persist broker endpoint");
            self.emit_error(format!("Failed to save broker config: {e}"));
        }

        info!(broker = %endpoint, "Broker endpoint updated, restarting session");
        self.stop().await;
        self.start().await;
    }

    async fn register(&mut self) {
        let metadata = self.ctx.platform.metadata();
        let identity = &self.ctx.identity;
        let record = RegistrationRecord {
            device_id: identity.device_id().to_string(),
            device_type: DEVICE_TYPE.to_string(),
            device_name: identity.display_name(),
            device_model: metadata.model,
            device_version: metadata.os_version,
            app_version: metadata.app_version,
            screen_resolution: metadata.screen_resolution,
            location: metadata.location,
            timestamp: now_millis(),
        };
        let topic = self.ctx.topics.registration.clone();
        if self.publish_json(&topic, &record, false).await {
            info!(device_id = %record.device_id, "Device registered");
        }
    }

    async fn send_heartbeat(&mut self) {
        let record = heartbeat_record(self.ctx.identity.device_id(), self.ctx.platform.telemetry());
        let topic = self.ctx.topics.heartbeat.clone();
        if self.publish_json(&topic, &record, false).await {
            metrics().heartbeat_sent();
            debug!("Heartbeat sent");
        }
    }

    async fn publish_json<R: Serialize>(&mut self, topic: &str, record: &R, retained: bool) -> bool {
        match serde_json::to_vec(record) {
            Ok(payload) => self.publish(topic, payload, retained).await,
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to serialize payload");
                false
            }
        }
    }

    /// QoS 1 publish; dropped with a warning unless connected
    async fn publish(&mut self, topic: &str, payload: Vec<u8>, retained: bool) -> bool {
        if self.state != ConnectionState::Connected {
            warn!(topic = %topic, state = %self.state, "Not connected, dropping publish");
            metrics().publish_dropped();
            return false;
        }

        match self
            .transport
            .publish(topic, payload, QoS::AtLeastOnce, retained)
            .await
        {
            Ok(()) => {
                metrics().message_published();
                debug!(topic = %topic, "Published");
                true
            }
            Err(e) => {
                metrics().publish_failed();
                error!(topic = %topic, error = %e, "Publish failed");
                false
            }
        }
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(SessionStatus {
            state: self.state,
            attempt_count: self.reconnect.attempt_count(),
            heartbeat_active: self.heartbeat.is_active(),
            reconnect_pending: self.reconnect.pending_delay(),
            reconnect_exhausted: self.reconnect.is_exhausted(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Dispatcher gone, dropping session event");
        }
    }

    fn emit_error(&self, message: String) {
        self.emit(SessionEvent::Error(sanitize_error_message(&message)));
    }
}

/// Facade-side handle to a running session actor
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<SessionStatus>,
    _task: JoinHandle<()>,
}

impl SessionHandle {
    /// Spawn the actor on the current runtime
    pub fn spawn<T: BrokerTransport>(
        transport: T,
        ctx: SessionContext,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let client_id = ctx.identity.client_id().to_string();
        let (manager, status) = SessionManager::new(transport, ctx, events);
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let span = crate::session_span!(client_id = %client_id);
        let task = tokio::spawn(manager.run(commands_rx).instrument(span));

        Self {
            commands,
            status,
            _task: task,
        }
    }

    pub fn send(&self, command: SessionCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::session_closed("session actor is not running"))
    }

    /// Send a command carrying a completion channel and wait for it
    pub async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> SessionCommand,
    ) -> ClientResult<()> {
        let (done, done_rx) = oneshot::channel();
        self.send(make(done))?;
        done_rx
            .await
            .map_err(|_| ClientError::session_closed("session actor stopped before replying"))
    }

    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }
}
