//! Application facade
//!
//! [`DeviceClient`] is the only type a host application needs. It resolves the
//! device identity, spawns the session actor and the callback dispatcher, and
//! turns every call into a message for the actor. No method returns an error
//! to the caller: failures are logged and reported through
//! [`ClientCallbacks::on_error`].

use crate::callbacks::ClientCallbacks;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::platform::DevicePlatform;
use crate::protocol::{DeviceIdentity, TopicSet};
use crate::routing::{Dispatcher, MessageRouter};
use crate::session::{
    SessionCommand, SessionContext, SessionHandle, SessionSettings, SessionStatus,
    stored_endpoint,
};
use crate::store::ConfigStore;
use crate::transport::{BrokerEndpoint, BrokerTransport};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Dropping the client closes the actor's command channel; the actor then runs
/// its stop sequence and exits, and the dispatcher follows.
pub struct DeviceClient {
    identity: DeviceIdentity,
    topics: TopicSet,
    store: Arc<dyn ConfigStore>,
    default_endpoint: BrokerEndpoint,
    session: SessionHandle,
    callbacks: watch::Sender<Option<Arc<dyn ClientCallbacks>>>,
    _dispatcher: JoinHandle<()>,
}

impl DeviceClient {
    /// Build the client and spawn its tasks on the current runtime.
    ///
    /// Fails only when the device identity cannot be loaded or persisted.
    /// Nothing connects until [`DeviceClient::start`].
    pub fn new<T: BrokerTransport>(
        config: &ClientConfig,
        transport: T,
        store: Arc<dyn ConfigStore>,
        platform: Arc<dyn DevicePlatform>,
    ) -> ClientResult<Self> {
        let identity = DeviceIdentity::load_or_create(store.as_ref())?;
        let topics = TopicSet::for_identity(&config.session.topic_prefix, &identity);
        let settings = SessionSettings::from_config(config);
        let default_endpoint = settings.default_endpoint.clone();

        let (callbacks, callbacks_rx) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::new(MessageRouter::new(&topics), callbacks_rx).spawn(events_rx);

        let ctx = SessionContext {
            identity: identity.clone(),
            topics: topics.clone(),
            store: store.clone(),
            platform,
            settings,
        };
        let session = SessionHandle::spawn(transport, ctx, events_tx);

        info!(
            device_id = %identity.device_id(),
            client_id = %identity.client_id(),
            "Display client created"
        );

        Ok(Self {
            identity,
            topics,
            store,
            default_endpoint,
            session,
            callbacks,
            _dispatcher: dispatcher,
        })
    }

    /// Register the callback set, replacing any previous one
    pub fn set_callbacks(&self, callbacks: Arc<dyn ClientCallbacks>) {
        self.callbacks.send_replace(Some(callbacks));
    }

    pub fn clear_callbacks(&self) {
        self.callbacks.send_replace(None);
    }

    /// Begin connecting; no-op unless disconnected
    pub fn start(&self) {
        self.submit(SessionCommand::Start, "start");
    }

    /// Publish an offline status, disconnect and cancel all timers.
    ///
    /// When this returns no heartbeat or reconnect will fire.
    pub async fn stop(&self) {
        if let Err(e) = self.session.request(|done| SessionCommand::Stop { done }).await {
            self.report("stop", &e);
        }
    }

    /// QoS 1 publish; dropped with a warning while not connected
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, retained: bool) {
        self.submit(
            SessionCommand::Publish {
                topic: topic.to_string(),
                payload: payload.into(),
                retained,
            },
            "publish",
        );
    }

    /// Publish a status record on the device status topic
    pub fn send_status(&self, status: &str, details: Option<&str>) {
        self.submit(
            SessionCommand::SendStatus {
                status: status.to_string(),
                details: details.map(str::to_string),
            },
            "send_status",
        );
    }

    /// Forget past failures and connect now
    pub fn reconnect(&self) {
        self.submit(SessionCommand::ManualReconnect, "reconnect");
    }

    /// Persist a new broker endpoint and restart the session against it
    pub async fn update_broker_config(&self, host: &str, port: u16) {
        let endpoint = BrokerEndpoint::new(host.trim(), port);
        let result = self
            .session
            .request(|done| SessionCommand::UpdateBrokerConfig { endpoint, done })
            .await;
        if let Err(e) = result {
            self.report("update_broker_config", &e);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.status().is_connected()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// Watch every session state transition
    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.session.watch_status()
    }

    pub fn device_id(&self) -> &str {
        self.identity.device_id()
    }

    pub fn client_id(&self) -> &str {
        self.identity.client_id()
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    /// `host:port` of the endpoint the next connect will use
    pub fn broker_info(&self) -> String {
        stored_endpoint(self.store.as_ref(), &self.default_endpoint).to_string()
    }

    fn submit(&self, command: SessionCommand, operation: &'static str) {
        if let Err(e) = self.session.send(command) {
            self.report(operation, &e);
        }
    }

    fn report(&self, operation: &'static str, e: &ClientError) {
        let message = e.to_user_message();
        error!(operation = operation, error = %message, "Client operation failed");
        let callbacks = self.callbacks.borrow().clone();
        if let Some(callbacks) = callbacks {
            callbacks.on_error(message);
        }
    }
}
