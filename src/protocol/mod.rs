//! Wire contract with the cloud platform: topic namespace and payload records

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
