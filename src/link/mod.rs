//! Link layer glue
//!
//! Ties the protocol types to a transport: the controller's dispatch loop
//! and the device-side scheduling driver. The transport itself only moves
//! complete framed byte sequences and lives outside this crate.

pub mod controller;
pub mod device;

pub use self::controller::{AddressAllocator, Controller, DeviceRecord};
pub use self::device::Device;
