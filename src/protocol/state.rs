use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::{Address, DeviceType, Error, ModuleType, Result};
use super::message::Message;

/// Address-assignment lifecycle of a device
///
/// A factory-fresh device holds the reserved `0000` address and stays mute.
/// A manual trigger (the physical button) sends exactly one identification
/// request; if no response arrives within the bounded wait the device goes
/// idle again, with no automatic retry. A correct response is terminal: the
/// assigned address persists across power cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentState {
    /// No address; device is mute until the next manual trigger
    Unassigned,

    /// Identification request sent, waiting for the response
    Requested {
        /// Time the request was sent
        sent_at: SystemTime,
    },

    /// Address received and stored; terminal unless externally reset
    Assigned {
        /// The controller-assigned address
        address: Address,
    },
}

/// Device-side state machine for the identification handshake
pub struct AddressAssignment {
    /// Device-type code reported in the identification request
    device_type: DeviceType,
    /// Module-type identifier reported in the identification request
    module_type: ModuleType,
    /// Current lifecycle state
    state: AssignmentState,
    /// Channel for outgoing messages
    message_tx: mpsc::Sender<Message>,
    /// Bounded wait for the identification response
    wait: Duration,
}

impl AddressAssignment {
    /// Creates the state machine for a device with no stored address
    pub fn new(
        device_type: DeviceType,
        module_type: ModuleType,
        message_tx: mpsc::Sender<Message>,
        wait: Duration,
    ) -> Self {
        AddressAssignment {
            device_type,
            module_type,
            state: AssignmentState::Unassigned,
            message_tx,
            wait,
        }
    }

    /// Creates the state machine from an address persisted by an earlier run
    ///
    /// The reserved `0000` address counts as no address at all.
    pub fn with_stored_address(
        device_type: DeviceType,
        module_type: ModuleType,
        message_tx: mpsc::Sender<Message>,
        wait: Duration,
        stored: Address,
    ) -> Self {
        let mut assignment = Self::new(device_type, module_type, message_tx, wait);
        if !stored.is_unassigned() {
            assignment.state = AssignmentState::Assigned { address: stored };
        }
        assignment
    }

    /// Returns the current lifecycle state
    pub fn state(&self) -> AssignmentState {
        self.state
    }

    /// Returns the device's address: the assigned one, or `0000`
    pub fn address(&self) -> Address {
        match self.state {
            AssignmentState::Assigned { address } => address,
            _ => Address::UNASSIGNED,
        }
    }

    /// Returns whether the handshake has completed
    pub fn is_assigned(&self) -> bool {
        matches!(self.state, AssignmentState::Assigned { .. })
    }

    /// Handles the manual trigger: sends one identification request
    ///
    /// Each trigger sends exactly once; there is no automatic retry for this
    /// class. Triggering an already-assigned device is an error.
    pub async fn trigger(&mut self) -> Result<()> {
        match self.state {
            AssignmentState::Unassigned | AssignmentState::Requested { .. } => {
                let request =
                    Message::identification_with_type(self.device_type, self.module_type);

                self.message_tx.send(request).await.map_err(|e| {
                    Error::protocol(format!("Failed to send identification request: {}", e))
                })?;

                debug!(module_type = %self.module_type, "identification request sent");
                self.state = AssignmentState::Requested {
                    sent_at: SystemTime::now(),
                };
                Ok(())
            }
            AssignmentState::Assigned { .. } => {
                Err(Error::invalid_state("Device already holds an address"))
            }
        }
    }

    /// Handles an incoming message while waiting for assignment
    ///
    /// Only an identification response in the `Requested` state is
    /// meaningful; anything else is an invalid-state error for the caller to
    /// log and drop.
    pub async fn handle_message(&mut self, message: Message) -> Result<()> {
        match message {
            Message::IdentificationResponse { address } => {
                if !matches!(self.state, AssignmentState::Requested { .. }) {
                    return Err(Error::invalid_state(
                        "Received identification response without a pending request",
                    ));
                }
                if address.is_unassigned() {
                    return Err(Error::protocol(
                        "Controller assigned the reserved 0000 address",
                    ));
                }

                info!(%address, "address assigned");
                self.state = AssignmentState::Assigned { address };
                Ok(())
            }
            other => Err(Error::invalid_state(format!(
                "Unexpected message during assignment: 0x{:02X}",
                other.type_code()
            ))),
        }
    }

    /// Reverts to `Unassigned` when the bounded wait has elapsed
    ///
    /// Returns whether the pending request was abandoned.
    pub fn check_timeout(&mut self, now: SystemTime) -> Result<bool> {
        if let AssignmentState::Requested { sent_at } = self.state {
            let elapsed = now
                .duration_since(sent_at)
                .map_err(|e| Error::timing(format!("Time went backwards: {}", e)))?;

            if elapsed >= self.wait {
                debug!("identification response wait elapsed, going idle");
                self.state = AssignmentState::Unassigned;
                return Ok(true);
            }
        }
        Ok(false)
    }
}
