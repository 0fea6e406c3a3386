//! Broker session: the actor that owns connection state, plus the reconnect
//! and heartbeat timers it drives

pub mod heartbeat;
pub mod manager;
pub mod reconnect;
pub mod state;
pub mod timer;

pub use heartbeat::{HeartbeatScheduler, heartbeat_record};
pub use manager::{
    SessionCommand, SessionContext, SessionEvent, SessionHandle, SessionManager,
    SessionSettings, stored_endpoint,
};
pub use reconnect::{ReconnectController, ReconnectDecision, ReconnectPolicy};
pub use state::{ConnectionState, SessionStatus};
pub use timer::{TimerEvent, TimerSlot};
