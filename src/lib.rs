//! SimpleBee: message protocol for battery-powered wireless peripherals
//!
//! This library implements the request/response protocol spoken between a
//! central controller and its sensors and actuators over a shared
//! low-bandwidth serial or radio link: the message taxonomy with its
//! fixed-width wire encoding, the checksum and framing discipline, the
//! address-assignment handshake, and the per-class timing and retry policy.

pub mod core;
pub mod link;
pub mod protocol;

// Re-export commonly used items
pub use crate::core::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
