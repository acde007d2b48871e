use bytes::{BufMut, BytesMut};

use crate::core::{
    Address, DeviceType, Error, ModuleType, Result,
    ADDRESS_SIZE, BATTERY_DELIMITER, MODULE_TYPE_SIZE,
};

/// Bit set on a request's type code to produce its paired response code
pub const RESPONSE_BIT: u8 = 0x20;

/// The four message classes of the SimpleBee protocol
///
/// Request codes are uppercase ASCII letters, so the paired response code
/// (`request | 0x20`) is the corresponding lowercase letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Address-assignment handshake
    Identification = b'I',
    /// Actuator request poll
    Request = b'R',
    /// Sensor heartbeat
    Watchdog = b'W',
    /// Sensor state-change report
    Data = b'D',
}

impl MessageType {
    /// All message types, in wire-code order
    pub const ALL: [MessageType; 4] = [
        MessageType::Identification,
        MessageType::Request,
        MessageType::Watchdog,
        MessageType::Data,
    ];

    /// Returns the request type code
    pub const fn request_code(self) -> u8 {
        self as u8
    }

    /// Derives the paired response type code
    pub const fn response_code(self) -> u8 {
        self.request_code() | RESPONSE_BIT
    }

    /// Looks up the message type for a request code
    pub fn from_request_code(code: u8) -> Option<MessageType> {
        match code {
            b'I' => Some(MessageType::Identification),
            b'R' => Some(MessageType::Request),
            b'W' => Some(MessageType::Watchdog),
            b'D' => Some(MessageType::Data),
            _ => None,
        }
    }

    /// Classifies a wire code as a request or the response to a known request
    ///
    /// Returns `None` when the code is neither a known request code nor a
    /// known request code with the response bit set.
    pub fn classify(code: u8) -> Option<(MessageType, bool)> {
        if let Some(kind) = MessageType::from_request_code(code) {
            return Some((kind, false));
        }
        MessageType::from_request_code(code & !RESPONSE_BIT)
            .filter(|kind| kind.response_code() == code)
            .map(|kind| (kind, true))
    }
}

/// Encodes a two-state value as the ASCII digit '0' or '1'
///
/// Any input wraps via modulo; out-of-range values are normalized, not
/// rejected.
pub const fn state_digit(value: u8) -> u8 {
    b'0' + value % 2
}

/// Encodes a battery level as an ASCII digit, '0' (empty) to '9' (full)
///
/// Inputs above 9 wrap via modulo rather than erroring.
pub const fn battery_digit(level: u8) -> u8 {
    b'0' + level % 10
}

/// Shared payload shape of the two-state device requests (watchdog, data)
///
/// Carries the already-encoded wire bytes: `value` is whatever byte the
/// construction path produced, `battery` an ASCII digit when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPayload {
    /// Sender's assigned address
    pub address: Address,
    /// Value byte as it appears on the wire
    pub value: u8,
    /// Battery level digit, present only when the device reports it
    pub battery: Option<u8>,
}

impl SwitchPayload {
    /// Builds a payload storing the value byte as-is, with no modulo
    ///
    /// This is the raw entry point: the byte goes on the wire unchanged and
    /// unchecked.
    pub fn from_raw(address: Address, value: u8) -> Self {
        SwitchPayload {
            address,
            value,
            battery: None,
        }
    }

    /// Builds a payload from a logical two-state value, encoded mod 2
    pub fn from_state(address: Address, state: u8) -> Self {
        SwitchPayload {
            address,
            value: state_digit(state),
            battery: None,
        }
    }

    /// Attaches a battery level, encoded mod 10
    pub fn with_battery(mut self, level: u8) -> Self {
        self.battery = Some(battery_digit(level));
        self
    }
}

/// Protocol messages exchanged between the controller and its devices
///
/// A message exists only for the duration of one transmit or receive cycle:
/// it is built immediately before encoding or immediately after a frame
/// passes checksum validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Address request from a factory-fresh device
    IdentificationReq {
        /// Device-type code from the external enumeration
        device_type: DeviceType,
        /// 3-byte module-type identifier
        module_type: ModuleType,
    },

    /// Controller's reply carrying the freshly assigned address
    IdentificationResponse {
        /// Address the device must persist for all future sessions
        address: Address,
    },

    /// Actuator poll, sent every 500 ms
    RequestReq {
        /// Sender's assigned address
        address: Address,
        /// Value byte as it appears on the wire
        value: u8,
        /// Battery level digit, present only when reported
        battery: Option<u8>,
    },

    /// Controller's reply to an actuator poll
    RequestResponse {
        /// Polling device's address
        address: Address,
        /// Commanded two-state value, ASCII digit
        value: u8,
    },

    /// Sensor heartbeat
    WatchdogReq {
        /// Heartbeat payload
        report: SwitchPayload,
    },

    /// Controller's acknowledgement of a heartbeat
    WatchdogResponse {
        /// Heartbeating device's address
        address: Address,
        /// Echoed two-state value, ASCII digit
        value: u8,
    },

    /// Sensor state-change report
    DataReq {
        /// Report payload
        report: SwitchPayload,
    },

    /// Controller's acknowledgement of a state-change report
    DataResponse {
        /// Reporting device's address
        address: Address,
        /// Echoed two-state value, ASCII digit
        value: u8,
    },
}

impl Message {
    /// Builds an identification request for a sensor module
    pub fn identification(module_type: ModuleType) -> Self {
        Message::identification_with_type(DeviceType::SENSOR, module_type)
    }

    /// Builds an identification request with an explicit device type
    pub fn identification_with_type(device_type: DeviceType, module_type: ModuleType) -> Self {
        Message::IdentificationReq {
            device_type,
            module_type,
        }
    }

    /// Builds the identification response carrying an assigned address
    pub fn identification_response(address: Address) -> Self {
        Message::IdentificationResponse { address }
    }

    /// Builds an actuator poll with a logical two-state value, encoded mod 2
    pub fn request(address: Address, state: u8) -> Self {
        Message::RequestReq {
            address,
            value: state_digit(state),
            battery: None,
        }
    }

    /// Builds an actuator poll that also reports battery level, encoded mod 10
    pub fn request_with_battery(address: Address, state: u8, battery: u8) -> Self {
        Message::RequestReq {
            address,
            value: state_digit(state),
            battery: Some(battery_digit(battery)),
        }
    }

    /// Builds the controller's reply to an actuator poll, value encoded mod 2
    pub fn request_response(address: Address, state: u8) -> Self {
        Message::RequestResponse {
            address,
            value: state_digit(state),
        }
    }

    /// Builds a sensor heartbeat from a two-state payload
    pub fn watchdog(report: SwitchPayload) -> Self {
        Message::WatchdogReq { report }
    }

    /// Builds the controller's heartbeat acknowledgement, value encoded mod 2
    pub fn watchdog_response(address: Address, state: u8) -> Self {
        Message::WatchdogResponse {
            address,
            value: state_digit(state),
        }
    }

    /// Builds a sensor state-change report from a two-state payload
    pub fn data(report: SwitchPayload) -> Self {
        Message::DataReq { report }
    }

    /// Builds the controller's report acknowledgement, value encoded mod 2
    pub fn data_response(address: Address, state: u8) -> Self {
        Message::DataResponse {
            address,
            value: state_digit(state),
        }
    }

    /// Returns the message class this message belongs to
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::IdentificationReq { .. } | Message::IdentificationResponse { .. } => {
                MessageType::Identification
            }
            Message::RequestReq { .. } | Message::RequestResponse { .. } => MessageType::Request,
            Message::WatchdogReq { .. } | Message::WatchdogResponse { .. } => MessageType::Watchdog,
            Message::DataReq { .. } | Message::DataResponse { .. } => MessageType::Data,
        }
    }

    /// Returns whether this is a response message
    pub fn is_response(&self) -> bool {
        matches!(
            self,
            Message::IdentificationResponse { .. }
                | Message::RequestResponse { .. }
                | Message::WatchdogResponse { .. }
                | Message::DataResponse { .. }
        )
    }

    /// Returns the one-byte type code this message carries on the wire
    pub fn type_code(&self) -> u8 {
        let kind = self.message_type();
        if self.is_response() {
            kind.response_code()
        } else {
            kind.request_code()
        }
    }

    /// Returns the device address this message concerns, if it carries one
    ///
    /// Identification requests are the one class sent before an address
    /// exists.
    pub fn address(&self) -> Option<Address> {
        match self {
            Message::IdentificationReq { .. } => None,
            Message::IdentificationResponse { address }
            | Message::RequestResponse { address, .. }
            | Message::WatchdogResponse { address, .. }
            | Message::DataResponse { address, .. } => Some(*address),
            Message::RequestReq { address, .. } => Some(*address),
            Message::WatchdogReq { report } | Message::DataReq { report } => Some(report.address),
        }
    }

    /// Appends this message's payload bytes (everything after the type code)
    pub fn encode_payload(&self, dst: &mut BytesMut) {
        match self {
            Message::IdentificationReq {
                device_type,
                module_type,
            } => {
                dst.put_u8(device_type.0);
                dst.extend_from_slice(module_type.as_bytes());
            }
            Message::IdentificationResponse { address } => {
                dst.extend_from_slice(address.as_bytes());
            }
            Message::RequestReq {
                address,
                value,
                battery,
            } => {
                encode_switch_fields(dst, *address, *value, *battery);
            }
            Message::WatchdogReq { report } | Message::DataReq { report } => {
                encode_switch_fields(dst, report.address, report.value, report.battery);
            }
            Message::RequestResponse { address, value }
            | Message::WatchdogResponse { address, value }
            | Message::DataResponse { address, value } => {
                dst.extend_from_slice(address.as_bytes());
                dst.put_u8(*value);
            }
        }
    }

    /// Parses a message from its type code and payload bytes
    ///
    /// The payload excludes the checksum trailer and frame delimiter; the
    /// caller has already validated those.
    pub fn parse(code: u8, payload: &[u8]) -> Result<Message> {
        let (kind, is_response) =
            MessageType::classify(code).ok_or(Error::UnknownType(code))?;

        match (kind, is_response) {
            (MessageType::Identification, false) => {
                if payload.len() != 1 + MODULE_TYPE_SIZE {
                    return Err(Error::frame(format!(
                        "identification request payload must be {} bytes, got {}",
                        1 + MODULE_TYPE_SIZE,
                        payload.len()
                    )));
                }
                let mut module_type = [0u8; MODULE_TYPE_SIZE];
                module_type.copy_from_slice(&payload[1..]);
                Ok(Message::IdentificationReq {
                    device_type: DeviceType(payload[0]),
                    module_type: ModuleType(module_type),
                })
            }
            (MessageType::Identification, true) => {
                let address = parse_address(payload, "identification response")?;
                Ok(Message::IdentificationResponse { address })
            }
            (MessageType::Request, false) => {
                let report = parse_switch_fields(payload)?;
                Ok(Message::RequestReq {
                    address: report.address,
                    value: report.value,
                    battery: report.battery,
                })
            }
            (MessageType::Watchdog, false) => {
                Ok(Message::WatchdogReq {
                    report: parse_switch_fields(payload)?,
                })
            }
            (MessageType::Data, false) => {
                Ok(Message::DataReq {
                    report: parse_switch_fields(payload)?,
                })
            }
            (kind, true) => {
                let (address, value) = parse_address_value(payload)?;
                Ok(match kind {
                    MessageType::Request => Message::RequestResponse { address, value },
                    MessageType::Watchdog => Message::WatchdogResponse { address, value },
                    MessageType::Data => Message::DataResponse { address, value },
                    MessageType::Identification => unreachable!("handled above"),
                })
            }
        }
    }
}

fn encode_switch_fields(dst: &mut BytesMut, address: Address, value: u8, battery: Option<u8>) {
    dst.extend_from_slice(address.as_bytes());
    dst.put_u8(value);
    if let Some(level) = battery {
        dst.put_u8(BATTERY_DELIMITER);
        dst.put_u8(level);
    }
}

fn parse_address(payload: &[u8], what: &str) -> Result<Address> {
    let bytes: [u8; ADDRESS_SIZE] = payload
        .try_into()
        .map_err(|_| Error::frame(format!("{} payload must be {} bytes", what, ADDRESS_SIZE)))?;
    Ok(Address(bytes))
}

fn parse_address_value(payload: &[u8]) -> Result<(Address, u8)> {
    if payload.len() != ADDRESS_SIZE + 1 {
        return Err(Error::frame(format!(
            "response payload must be {} bytes, got {}",
            ADDRESS_SIZE + 1,
            payload.len()
        )));
    }
    let address = parse_address(&payload[..ADDRESS_SIZE], "response")?;
    Ok((address, payload[ADDRESS_SIZE]))
}

fn parse_switch_fields(payload: &[u8]) -> Result<SwitchPayload> {
    let battery = match payload.len() {
        n if n == ADDRESS_SIZE + 1 => None,
        n if n == ADDRESS_SIZE + 3 => {
            if payload[ADDRESS_SIZE + 1] != BATTERY_DELIMITER {
                return Err(Error::frame("missing battery delimiter".to_string()));
            }
            Some(payload[ADDRESS_SIZE + 2])
        }
        n => {
            return Err(Error::frame(format!(
                "switch request payload must be {} or {} bytes, got {}",
                ADDRESS_SIZE + 1,
                ADDRESS_SIZE + 3,
                n
            )));
        }
    };

    let address = parse_address(&payload[..ADDRESS_SIZE], "switch request")?;
    Ok(SwitchPayload {
        address,
        value: payload[ADDRESS_SIZE],
        battery,
    })
}
