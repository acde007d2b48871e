//! Protocol implementation module
//!
//! This module defines the SimpleBee message taxonomy, the frame codec with
//! its checksum discipline, the address-assignment state machine, and the
//! per-class timing policy.

pub mod checksum;
pub mod codec;
pub mod message;
pub mod policy;
pub mod state;

pub use self::checksum::{Checksum, SumChecksum};
pub use self::codec::SbCodec;
pub use self::message::{Message, MessageType, SwitchPayload, RESPONSE_BIT};
pub use self::policy::{ClassPolicy, MessageClass, SendSchedule};
pub use self::state::{AddressAssignment, AssignmentState};
