//! Application-facing delivery queue
//!
//! Session events are consumed on their own task so a slow or panicking
//! callback can never stall the session actor or the transport.

use super::router::{MessageRouter, RouteOutcome, RoutedMessage};
use crate::callbacks::ClientCallbacks;
use crate::observability::metrics;
use crate::session::SessionEvent;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Registered callback set, replaceable at any time
pub type CallbackSlot = watch::Receiver<Option<Arc<dyn ClientCallbacks>>>;

pub struct Dispatcher {
    router: MessageRouter,
    callbacks: CallbackSlot,
}

impl Dispatcher {
    pub fn new(router: MessageRouter, callbacks: CallbackSlot) -> Self {
        Self { router, callbacks }
    }

    /// Spawn the delivery loop; it ends when the session drops its sender
    pub fn spawn(self, events: mpsc::UnboundedReceiver<SessionEvent>) -> JoinHandle<()> {
        tokio::spawn(self.run(events))
    }

    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event);
        }
        debug!("Dispatcher stopped");
    }

    pub fn dispatch(&self, event: SessionEvent) {
        let callbacks = self.callbacks.borrow().clone();

        match event {
            SessionEvent::Connected => deliver(callbacks, "on_connected", |cb| cb.on_connected()),
            SessionEvent::Disconnected => {
                deliver(callbacks, "on_disconnected", |cb| cb.on_disconnected())
            }
            SessionEvent::Error(message) => {
                deliver(callbacks, "on_error", move |cb| cb.on_error(message))
            }
            SessionEvent::Message(message) => match self.router.route(&message) {
                RouteOutcome::Routed(RoutedMessage::Content(content)) => {
                    debug!(content_id = %content.content.id, "Content received");
                    deliver(callbacks, "on_content_received", move |cb| {
                        cb.on_content_received(content)
                    })
                }
                RouteOutcome::Routed(RoutedMessage::Command(command)) => {
                    debug!(command = %command.command, "Command received");
                    deliver(callbacks, "on_command_received", move |cb| {
                        cb.on_command_received(command)
                    })
                }
                RouteOutcome::Routed(RoutedMessage::Broadcast(text)) => {
                    deliver(callbacks, "on_broadcast_received", move |cb| {
                        cb.on_broadcast_received(text)
                    })
                }
                RouteOutcome::Malformed { kind, error } => {
                    metrics().message_malformed();
                    warn!(topic = %message.topic, kind = %kind, error = %error, "Dropping malformed payload");
                }
                RouteOutcome::Unmatched => {
                    metrics().message_unmatched();
                    debug!(topic = %message.topic, "No route for topic");
                }
            },
        }
    }
}

fn deliver<F>(callbacks: Option<Arc<dyn ClientCallbacks>>, name: &'static str, call: F)
where
    F: FnOnce(&dyn ClientCallbacks),
{
    let Some(callbacks) = callbacks else {
        debug!(callback = name, "No callbacks registered");
        return;
    };

    if catch_unwind(AssertUnwindSafe(|| call(callbacks.as_ref()))).is_err() {
        metrics().callback_panicked();
        error!(callback = name, "Application callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, TopicSet};
    use crate::transport::InboundMessage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    impl ClientCallbacks for Collect {
        fn on_connected(&self) {
            panic!("callback failure");
        }

        fn on_command_received(&self, command: Command) {
            self.seen.lock().unwrap().push(command.command);
        }

        fn on_error(&self, message: String) {
            self.seen.lock().unwrap().push(message);
        }
    }

    fn dispatcher(callbacks: Option<Arc<dyn ClientCallbacks>>) -> (Dispatcher, TopicSet) {
        let topics = TopicSet::derive("p", "c1");
        let (_tx, rx) = watch::channel(callbacks);
        (Dispatcher::new(MessageRouter::new(&topics), rx), topics)
    }

    #[test]
    fn test_panicking_callback_does_not_stop_delivery() {
        let collect = Arc::new(Collect::default());
        let (dispatcher, topics) = dispatcher(Some(collect.clone()));

        dispatcher.dispatch(SessionEvent::Connected);
        dispatcher.dispatch(SessionEvent::Message(InboundMessage::new(
            topics.command.as_str(),
            r#"{"command":"refresh"}"#,
        )));
        dispatcher.dispatch(SessionEvent::Error("boom".to_string()));

        assert_eq!(*collect.seen.lock().unwrap(), vec!["refresh", "boom"]);
    }

    #[test]
    fn test_malformed_payload_reaches_no_callback() {
        let collect = Arc::new(Collect::default());
        let (dispatcher, topics) = dispatcher(Some(collect.clone()));

        dispatcher.dispatch(SessionEvent::Message(InboundMessage::new(
            topics.command.as_str(),
            "[1,2",
        )));
        assert!(collect.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_no_callbacks_registered() {
        let (dispatcher, _) = dispatcher(None);
        dispatcher.dispatch(SessionEvent::Disconnected);
    }
}
