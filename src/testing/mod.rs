//! Testing utilities and mock implementations
//!
//! Mock collaborators for exercising the client without a broker or a real
//! device.

pub mod mocks;

pub use mocks::*;
