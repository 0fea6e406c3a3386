//! Mock implementations for testing
//!
//! `MockTransport` stands in for the broker: connect outcomes are scripted,
//! every call is recorded, and tests can inject connection loss or inbound
//! messages through the sink of the most recent connect.

use crate::callbacks::ClientCallbacks;
use crate::protocol::{Command, ContentPush};
use crate::transport::{
    BrokerEndpoint, BrokerTransport, ConnectOptions, ConnectResult, QoS, TransportError,
    TransportEventSink,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

pub use crate::platform::StaticPlatform;

/// One recorded transport call
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect {
        endpoint: BrokerEndpoint,
        client_id: String,
    },
    Subscribe {
        topic: String,
    },
    Publish {
        topic: String,
        payload: Vec<u8>,
        retained: bool,
    },
    Disconnect,
    Close,
}

/// Mock transport for testing
///
/// Clones share state, so a test keeps one clone and hands the other to the
/// client under test.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Outcomes consumed one per connect, ahead of `default_outcome`
    pub scripted: Arc<Mutex<VecDeque<ConnectResult>>>,
    /// `None` leaves the connect pending forever
    pub default_outcome: Arc<Mutex<Option<ConnectResult>>>,
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    pub sink: Arc<Mutex<Option<TransportEventSink>>>,
    pub last_options: Arc<Mutex<Option<ConnectOptions>>>,
    pub should_fail_publish: Arc<Mutex<bool>>,
}

impl MockTransport {
    /// Connects never complete until scripted
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeding() -> Self {
        Self {
            default_outcome: Arc::new(Mutex::new(Some(ConnectResult::Success))),
            ..Default::default()
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            default_outcome: Arc::new(Mutex::new(Some(ConnectResult::Failure(
                cause.to_string(),
            )))),
            ..Default::default()
        }
    }

    /// Queue outcomes for the next connects
    pub async fn script(&self, outcomes: impl IntoIterator<Item = ConnectResult>) {
        self.scripted.lock().await.extend(outcomes);
    }

    pub async fn set_default_outcome(&self, outcome: Option<ConnectResult>) {
        *self.default_outcome.lock().await = outcome;
    }

    pub async fn set_publish_failure(&self, fail: bool) {
        *self.should_fail_publish.lock().await = fail;
    }

    pub async fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().await.clone()
    }

    pub async fn connect_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| matches!(call, MockCall::Connect { .. }))
            .count()
    }

    pub async fn get_subscriptions(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                MockCall::Subscribe { topic } => Some(topic.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn get_published_messages(&self) -> Vec<(String, Vec<u8>)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                MockCall::Publish { topic, payload, .. } => Some((topic.clone(), payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Publishes on `topic`, decoded as JSON
    pub async fn get_published_json(&self, topic: &str) -> Vec<serde_json::Value> {
        self.get_published_messages()
            .await
            .into_iter()
            .filter(|(published, _)| published == topic)
            .filter_map(|(_, payload)| serde_json::from_slice(&payload).ok())
            .collect()
    }

    pub async fn get_last_options(&self) -> Option<ConnectOptions> {
        self.last_options.lock().await.clone()
    }

    pub async fn clear_history(&self) {
        self.calls.lock().await.clear();
    }

    /// Report a connection loss on the current connection
    pub async fn drop_connection(&self, cause: &str) -> bool {
        match self.sink.lock().await.as_ref() {
            Some(sink) => sink.connection_lost(cause),
            None => false,
        }
    }

    /// Deliver an inbound publish on the current connection
    pub async fn deliver(&self, topic: &str, payload: impl Into<Vec<u8>>) -> bool {
        match self.sink.lock().await.as_ref() {
            Some(sink) => sink.message_arrived(topic, payload),
            None => false,
        }
    }

    /// Complete a pending connect
    pub async fn complete_connect(&self, outcome: ConnectResult) -> bool {
        match self.sink.lock().await.as_ref() {
            Some(sink) => sink.send(crate::transport::TransportEvent::Connect(outcome)),
            None => false,
        }
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        options: ConnectOptions,
        sink: TransportEventSink,
    ) -> Result<(), TransportError> {
        self.calls.lock().await.push(MockCall::Connect {
            endpoint: endpoint.clone(),
            client_id: options.client_id.clone(),
        });
        *self.last_options.lock().await = Some(options);

        let outcome = match self.scripted.lock().await.pop_front() {
            Some(outcome) => Some(outcome),
            None => self.default_outcome.lock().await.clone(),
        };
        if let Some(outcome) = outcome {
            sink.send(crate::transport::TransportEvent::Connect(outcome));
        }
        *self.sink.lock().await = Some(sink);
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, _qos: QoS) -> Result<(), TransportError> {
        self.calls.lock().await.push(MockCall::Subscribe {
            topic: topic.to_string(),
        });
        Ok(())
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Vec<u8>,
        _qos: QoS,
        retained: bool,
    ) -> Result<(), TransportError> {
        if *self.should_fail_publish.lock().await {
            return Err(TransportError::PublishFailed {
                topic: topic.to_string(),
                reason: "Mock publish failure".to_string(),
            });
        }

        self.calls.lock().await.push(MockCall::Publish {
            topic: topic.to_string(),
            payload,
            retained,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.calls.lock().await.push(MockCall::Disconnect);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.calls.lock().await.push(MockCall::Close);
        *self.sink.lock().await = None;
        Ok(())
    }
}

/// Callback invocation as seen by [`RecordingCallbacks`]
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Connected,
    Disconnected,
    Content(ContentPush),
    Command(Command),
    Broadcast(String),
    Error(String),
}

/// Callbacks that forward every invocation to an awaitable stream
#[derive(Debug)]
pub struct RecordingCallbacks {
    tx: mpsc::UnboundedSender<CallbackEvent>,
}

impl RecordingCallbacks {
    pub fn new() -> (Arc<Self>, CallbackEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), CallbackEvents { rx })
    }

    fn record(&self, event: CallbackEvent) {
        let _ = self.tx.send(event);
    }
}

impl ClientCallbacks for RecordingCallbacks {
    fn on_connected(&self) {
        self.record(CallbackEvent::Connected);
    }

    fn on_disconnected(&self) {
        self.record(CallbackEvent::Disconnected);
    }

    fn on_content_received(&self, content: ContentPush) {
        self.record(CallbackEvent::Content(content));
    }

    fn on_command_received(&self, command: Command) {
        self.record(CallbackEvent::Command(command));
    }

    fn on_broadcast_received(&self, message: String) {
        self.record(CallbackEvent::Broadcast(message));
    }

    fn on_error(&self, message: String) {
        self.record(CallbackEvent::Error(message));
    }
}

/// Receiving end of [`RecordingCallbacks`]
#[derive(Debug)]
pub struct CallbackEvents {
    rx: mpsc::UnboundedReceiver<CallbackEvent>,
}

impl CallbackEvents {
    /// Wait for the next invocation
    pub async fn next(&mut self) -> Option<CallbackEvent> {
        self.rx.recv().await
    }

    /// Skip invocations until one matches
    pub async fn wait_for(
        &mut self,
        mut predicate: impl FnMut(&CallbackEvent) -> bool,
    ) -> Option<CallbackEvent> {
        while let Some(event) = self.rx.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }
        None
    }

    /// Everything recorded so far, without waiting
    pub fn drain(&mut self) -> Vec<CallbackEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}
