//! Inbound message routing
//!
//! A table of `(topic, kind)` pairs is built once from the device's topic set.
//! Matching is exact string comparison in table order; decoding happens here so
//! the dispatcher only ever sees typed messages.

use crate::protocol::{Command, ContentPush, TopicSet};
use crate::transport::InboundMessage;
use std::fmt;

/// Which decoder and callback a topic maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Content,
    Command,
    Broadcast,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RouteKind::Content => "content",
            RouteKind::Command => "command",
            RouteKind::Broadcast => "broadcast",
        })
    }
}

/// Decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedMessage {
    Content(ContentPush),
    Command(Command),
    Broadcast(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Routed(RoutedMessage),
    /// Topic matched but the payload did not decode
    Malformed { kind: RouteKind, error: String },
    Unmatched,
}

#[derive(Debug, Clone)]
pub struct MessageRouter {
    routes: Vec<(String, RouteKind)>,
}

impl MessageRouter {
    pub fn new(topics: &TopicSet) -> Self {
        Self {
            routes: vec![
                (topics.content.clone(), RouteKind::Content),
                (topics.command.clone(), RouteKind::Command),
                (topics.broadcast.clone(), RouteKind::Broadcast),
            ],
        }
    }

    pub fn kind_for(&self, topic: &str) -> Option<RouteKind> {
        self.routes
            .iter()
            .find(|(route, _)| route == topic)
            .map(|(_, kind)| *kind)
    }

    pub fn route(&self, message: &InboundMessage) -> RouteOutcome {
        let Some(kind) = self.kind_for(&message.topic) else {
            return RouteOutcome::Unmatched;
        };

        let decoded = match kind {
            RouteKind::Content => serde_json::from_slice::<ContentPush>(&message.payload)
                .map(RoutedMessage::Content),
            RouteKind::Command => serde_json::from_slice::<Command>(&message.payload)
                .map(RoutedMessage::Command),
            RouteKind::Broadcast => Ok(RoutedMessage::Broadcast(
                String::from_utf8_lossy(&message.payload).into_owned(),
            )),
        };

        match decoded {
            Ok(routed) => RouteOutcome::Routed(routed),
            Err(e) => RouteOutcome::Malformed {
                kind,
                error: e.to_string(),
            },
        }
    }
}
