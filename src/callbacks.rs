//! Application-facing notification surface

use crate::protocol::{Command, ContentPush};

/// Receives session notifications and decoded inbound messages.
///
/// Every method defaults to a no-op so implementors only override what they
/// handle. Callbacks run on the dispatcher task, never on the session actor,
/// and a panic inside one is caught and logged.
pub trait ClientCallbacks: Send + Sync {
    fn on_connected(&self) {}

    fn on_disconnected(&self) {}

    fn on_content_received(&self, _content: ContentPush) {}

    fn on_command_received(&self, _command: Command) {}

    /// Raw broadcast payload, decoded as UTF-8 with replacement
    fn on_broadcast_received(&self, _message: String) {}

    /// Sanitized description of a failure
    fn on_error(&self, _message: String) {}
}
