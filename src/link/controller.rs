use std::collections::HashMap;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, trace};

use crate::core::{Address, DeviceType, Error, ModuleType, Result};
use crate::protocol::{Message, SbCodec};

/// Allocates fresh device addresses for identification responses
///
/// Every well-formed identification request gets a previously-unused
/// address; the reserved `0000` is never issued. How addresses are chosen is
/// the controller's own business since devices treat them as opaque bytes.
#[derive(Debug, Default)]
pub struct AddressAllocator {
    next: u32,
}

impl AddressAllocator {
    /// Creates an allocator that has issued nothing yet
    pub fn new() -> Self {
        AddressAllocator { next: 0 }
    }

    /// Returns a fresh, never-before-issued address
    pub fn allocate(&mut self) -> Result<Address> {
        self.next = self
            .next
            .checked_add(1)
            .ok_or_else(|| Error::protocol("Address space exhausted"))?;
        Ok(Address(self.next.to_be_bytes()))
    }
}

/// What the controller knows about one device on the link
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    /// Device-type code from the identification request, when seen
    pub device_type: Option<DeviceType>,
    /// Module-type identifier from the identification request, when seen
    pub module_type: Option<ModuleType>,
    /// Last value byte the device reported, as it arrived on the wire
    pub value: u8,
    /// Last battery digit the device reported
    pub battery: Option<u8>,
    /// Two-state value the controller wants an actuator to hold
    pub commanded: u8,
    /// When the device was last heard from
    pub last_seen: Instant,
}

impl DeviceRecord {
    fn new(now: Instant) -> Self {
        DeviceRecord {
            device_type: None,
            module_type: None,
            value: b'0',
            battery: None,
            commanded: 0,
            last_seen: now,
        }
    }
}

/// The central controller on a SimpleBee link
///
/// The link itself is a single shared half-duplex channel; concurrent
/// device traffic is demultiplexed by address, never by the link. Every
/// well-formed request gets its paired response; malformed frames never
/// reach this layer (the codec discards them) and inbound response-coded
/// messages are ignored.
pub struct Controller {
    allocator: AddressAllocator,
    devices: HashMap<Address, DeviceRecord>,
}

impl Controller {
    /// Creates a controller with no known devices
    pub fn new() -> Self {
        Controller {
            allocator: AddressAllocator::new(),
            devices: HashMap::new(),
        }
    }

    /// Returns what is known about a device
    pub fn device(&self, address: &Address) -> Option<&DeviceRecord> {
        self.devices.get(address)
    }

    /// Returns the number of devices heard from so far
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Sets the two-state value the next poll response commands an actuator
    /// to hold
    pub fn set_actuator(&mut self, address: Address, state: u8) {
        let record = self
            .devices
            .entry(address)
            .or_insert_with(|| DeviceRecord::new(Instant::now()));
        record.commanded = state % 2;
    }

    /// Dispatches one inbound message and composes its paired response
    ///
    /// Returns `None` for messages that warrant no reply (inbound
    /// responses).
    pub fn handle_message(&mut self, message: Message, now: Instant) -> Result<Option<Message>> {
        if message.is_response() {
            trace!(code = message.type_code(), "ignoring inbound response");
            return Ok(None);
        }

        match message {
            Message::IdentificationReq {
                device_type,
                module_type,
            } => {
                let address = self.allocator.allocate()?;
                let mut record = DeviceRecord::new(now);
                record.device_type = Some(device_type);
                record.module_type = Some(module_type);
                self.devices.insert(address, record);

                info!(%address, %module_type, "assigned address to new device");
                Ok(Some(Message::identification_response(address)))
            }

            Message::RequestReq {
                address,
                value,
                battery,
            } => {
                let commanded = {
                    let record = self.touch(address, now);
                    record.value = value;
                    if battery.is_some() {
                        record.battery = battery;
                    }
                    record.commanded
                };
                debug!(%address, "answering actuator poll");
                Ok(Some(Message::request_response(address, commanded)))
            }

            Message::WatchdogReq { report } => {
                let record = self.touch(report.address, now);
                record.value = report.value;
                if report.battery.is_some() {
                    record.battery = report.battery;
                }
                debug!(address = %report.address, "acknowledging heartbeat");
                Ok(Some(Message::WatchdogResponse {
                    address: report.address,
                    value: report.value,
                }))
            }

            Message::DataReq { report } => {
                let record = self.touch(report.address, now);
                record.value = report.value;
                if report.battery.is_some() {
                    record.battery = report.battery;
                }
                debug!(address = %report.address, "acknowledging data report");
                Ok(Some(Message::DataResponse {
                    address: report.address,
                    value: report.value,
                }))
            }

            // Responses were filtered out above
            _ => Ok(None),
        }
    }

    /// Serves the link: decodes frames, dispatches, sends paired responses
    ///
    /// Runs until the transport closes or fails.
    pub async fn serve<T>(&mut self, io: T) -> Result<()>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, SbCodec::new());

        while let Some(inbound) = framed.next().await {
            let message = inbound?;
            if let Some(response) = self.handle_message(message, Instant::now())? {
                framed.send(response).await?;
            }
        }

        Ok(())
    }

    fn touch(&mut self, address: Address, now: Instant) -> &mut DeviceRecord {
        let record = self
            .devices
            .entry(address)
            .or_insert_with(|| DeviceRecord::new(now));
        record.last_seen = now;
        record
    }
}

impl Default for Controller {
    fn default() -> Self {
        Controller::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SwitchPayload;

    #[test]
    fn test_allocator_never_issues_zero_or_repeats() {
        let mut allocator = AddressAllocator::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let address = allocator.allocate().unwrap();
            assert!(!address.is_unassigned());
            assert!(seen.insert(address), "address issued twice");
        }
    }

    #[test]
    fn test_identification_gets_fresh_address() {
        let mut controller = Controller::new();
        let now = Instant::now();

        let request = Message::identification(ModuleType(*b"LED"));
        let first = controller.handle_message(request.clone(), now).unwrap();
        let second = controller.handle_message(request, now).unwrap();

        let (a, b) = match (first, second) {
            (
                Some(Message::IdentificationResponse { address: a }),
                Some(Message::IdentificationResponse { address: b }),
            ) => (a, b),
            other => panic!("Expected identification responses, got {:?}", other),
        };
        assert_ne!(a, b);
        assert_eq!(controller.device_count(), 2);
        assert_eq!(
            controller.device(&a).unwrap().module_type,
            Some(ModuleType(*b"LED"))
        );
    }

    #[test]
    fn test_watchdog_ack_echoes_address_and_value() {
        let mut controller = Controller::new();
        let address = Address::new([0, 1, 0, 1]);
        let report = SwitchPayload::from_state(address, 1).with_battery(6);

        let response = controller
            .handle_message(Message::watchdog(report), Instant::now())
            .unwrap();

        assert_eq!(
            response,
            Some(Message::WatchdogResponse {
                address,
                value: b'1'
            })
        );
        let record = controller.device(&address).unwrap();
        assert_eq!(record.value, b'1');
        assert_eq!(record.battery, Some(b'6'));
    }

    #[test]
    fn test_poll_response_carries_commanded_state() {
        let mut controller = Controller::new();
        let address = Address::new([2, 2, 2, 2]);

        controller.set_actuator(address, 5); // wraps to 1
        let response = controller
            .handle_message(Message::request(address, 0), Instant::now())
            .unwrap();

        assert_eq!(response, Some(Message::request_response(address, 1)));
    }

    #[test]
    fn test_demux_by_address() {
        let mut controller = Controller::new();
        let now = Instant::now();
        let first = Address::new([1, 0, 0, 0]);
        let second = Address::new([2, 0, 0, 0]);

        controller
            .handle_message(Message::watchdog(SwitchPayload::from_state(first, 0)), now)
            .unwrap();
        controller
            .handle_message(Message::watchdog(SwitchPayload::from_state(second, 1)), now)
            .unwrap();

        assert_eq!(controller.device(&first).unwrap().value, b'0');
        assert_eq!(controller.device(&second).unwrap().value, b'1');
    }

    #[test]
    fn test_inbound_responses_ignored() {
        let mut controller = Controller::new();
        let response = Message::watchdog_response(Address::new([1, 2, 3, 4]), 1);
        let result = controller.handle_message(response, Instant::now()).unwrap();
        assert_eq!(result, None);
        assert_eq!(controller.device_count(), 0);
    }
}
