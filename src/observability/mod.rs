//! Structured logging and process metrics

pub mod logging;
pub mod metrics;

pub use logging::{LogFormat, init_default_logging, init_logging, parse_level};
pub use metrics::{MetricsCollector, MetricsSnapshot, metrics};

pub use logging::{mqtt_span, session_span};
