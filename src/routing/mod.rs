//! Inbound message routing and application callback delivery

pub mod dispatcher;
pub mod router;

pub use dispatcher::{CallbackSlot, Dispatcher};
pub use router::{MessageRouter, RouteKind, RouteOutcome, RoutedMessage};
