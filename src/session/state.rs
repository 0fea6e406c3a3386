//! Observable session state

use std::fmt;
use std::time::Duration;

/// Broker connection state as seen by the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// Snapshot published on the session's watch channel after every transition
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Failed attempts since the last successful connect
    pub attempt_count: u32,
    pub heartbeat_active: bool,
    /// Delay of the armed reconnect timer, if any
    pub reconnect_pending: Option<Duration>,
    /// Automatic reconnects gave up; only a manual reconnect resumes them
    pub reconnect_exhausted: bool,
}

impl SessionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
