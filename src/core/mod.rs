//! Core types and constants for the SimpleBee protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    Address,
    Config,
    DeviceType,
    ModuleType,
};

/// Size of a device address in bytes
pub const ADDRESS_SIZE: usize = 4;

/// Size of a module-type identifier in bytes
pub const MODULE_TYPE_SIZE: usize = 3;

/// Size of the checksum trailer in bytes
pub const CHECKSUM_SIZE: usize = 2;

/// End-of-message frame delimiter (carriage return)
pub const END_OF_MESSAGE: u8 = 0x0D;

/// Delimiter byte preceding an optional battery-level field
pub const BATTERY_DELIMITER: u8 = b'B';
