use std::fmt;
use std::time::Duration;

use serde::{Serialize, Deserialize};

/// Device address on the shared link
///
/// Addresses are opaque 4-byte identifiers compared byte-for-byte; they are
/// never interpreted numerically. The all-zero address is reserved for
/// devices that have not yet completed the identification handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; super::ADDRESS_SIZE]);

impl Address {
    /// The reserved "unassigned" address held by factory-fresh devices
    pub const UNASSIGNED: Address = Address([0; super::ADDRESS_SIZE]);

    /// Creates an address from its raw bytes
    pub const fn new(bytes: [u8; super::ADDRESS_SIZE]) -> Self {
        Address(bytes)
    }

    /// Returns whether this is the reserved unassigned address
    pub fn is_unassigned(&self) -> bool {
        *self == Address::UNASSIGNED
    }

    /// Returns the raw address bytes
    pub fn as_bytes(&self) -> &[u8; super::ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

/// Device type code supplied by the external device-type enumeration
///
/// Only the codes this crate itself needs are named here; any byte value is
/// accepted on the wire since the enumeration is owned by a collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceType(pub u8);

impl DeviceType {
    /// A sensor device (watchdog heartbeats plus data reports)
    pub const SENSOR: DeviceType = DeviceType(b'S');
    /// An actuator device (500 ms request polls)
    pub const ACTUATOR: DeviceType = DeviceType(b'A');
}

/// Module type identifier carried in identification requests, exactly 3 bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleType(pub [u8; super::MODULE_TYPE_SIZE]);

impl ModuleType {
    /// Creates a module type from its raw bytes
    pub const fn new(bytes: [u8; super::MODULE_TYPE_SIZE]) -> Self {
        ModuleType(bytes)
    }

    /// Returns the raw module-type bytes
    pub fn as_bytes(&self) -> &[u8; super::MODULE_TYPE_SIZE] {
        &self.0
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &byte in &self.0 {
            if byte.is_ascii_graphic() {
                write!(f, "{}", byte as char)?;
            } else {
                write!(f, "\\x{:02X}", byte)?;
            }
        }
        Ok(())
    }
}

/// Timing configuration for the SimpleBee link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Actuator poll cadence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
    /// How long an actuator waits for a poll response
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub response_wait: Duration,
    /// Sensor heartbeat cadence
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub watchdog_interval: Duration,
    /// Fixed interval between retries of unacknowledged sends
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub retry_interval: Duration,
    /// Total time a data report keeps retrying before giving up
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub data_retry_window: Duration,
    /// Bounded wait for an identification response before going idle
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub identification_wait: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            poll_interval: Duration::from_millis(500),
            response_wait: Duration::from_millis(100),
            watchdog_interval: Duration::from_secs(60),
            retry_interval: Duration::from_secs(2),
            data_retry_window: Duration::from_secs(2),
            identification_wait: Duration::from_secs(2),
        }
    }
}
