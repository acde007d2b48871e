use std::time::{Instant, SystemTime};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::core::{Address, Config, DeviceType, ModuleType, Result};
use crate::protocol::{
    AddressAssignment, Message, MessageClass, SendSchedule, SwitchPayload,
};

/// One peripheral's view of the link: address lifecycle plus send scheduling
///
/// A sensor emits watchdog heartbeats on the minute cadence and data reports
/// on state changes; an actuator polls every 500 ms. All cadences and
/// retries follow the per-class policy table; at most one request per class
/// is outstanding, and composing a newer send supersedes the unanswered
/// prior one.
pub struct Device {
    assignment: AddressAssignment,
    device_type: DeviceType,
    /// Current logical two-state value (0 or 1)
    value: u8,
    /// Raw battery level, reported when known
    battery: Option<u8>,
    watchdog: Option<SendSchedule>,
    data: Option<SendSchedule>,
    poll: Option<SendSchedule>,
    message_tx: mpsc::Sender<Message>,
}

impl Device {
    /// Creates a factory-fresh sensor
    pub fn sensor(module_type: ModuleType, message_tx: mpsc::Sender<Message>, config: &Config) -> Self {
        Self::build(DeviceType::SENSOR, module_type, message_tx, config, Address::UNASSIGNED)
    }

    /// Creates a factory-fresh actuator
    pub fn actuator(module_type: ModuleType, message_tx: mpsc::Sender<Message>, config: &Config) -> Self {
        Self::build(DeviceType::ACTUATOR, module_type, message_tx, config, Address::UNASSIGNED)
    }

    /// Creates a sensor that persisted an address in an earlier session
    pub fn sensor_with_address(
        module_type: ModuleType,
        message_tx: mpsc::Sender<Message>,
        config: &Config,
        stored: Address,
    ) -> Self {
        Self::build(DeviceType::SENSOR, module_type, message_tx, config, stored)
    }

    fn build(
        device_type: DeviceType,
        module_type: ModuleType,
        message_tx: mpsc::Sender<Message>,
        config: &Config,
        stored: Address,
    ) -> Self {
        let assignment = AddressAssignment::with_stored_address(
            device_type,
            module_type,
            message_tx.clone(),
            config.identification_wait,
            stored,
        );

        let schedule = |class: MessageClass| {
            SendSchedule::with_policy(class, class.policy_from(config))
        };
        let is_sensor = device_type == DeviceType::SENSOR;

        Device {
            assignment,
            device_type,
            value: 0,
            battery: None,
            watchdog: is_sensor.then(|| schedule(MessageClass::Watchdog)),
            data: is_sensor.then(|| schedule(MessageClass::Data)),
            poll: (!is_sensor).then(|| schedule(MessageClass::Request)),
            message_tx,
        }
    }

    /// Returns the device's address: the assigned one, or `0000`
    pub fn address(&self) -> Address {
        self.assignment.address()
    }

    /// Returns whether the identification handshake has completed
    pub fn is_assigned(&self) -> bool {
        self.assignment.is_assigned()
    }

    /// Returns the device-type code reported during identification
    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    /// Returns the current logical two-state value
    pub fn value(&self) -> u8 {
        self.value
    }

    /// Handles the physical button press that starts identification
    pub async fn press_button(&mut self) -> Result<()> {
        self.assignment.trigger().await
    }

    /// Abandons a pending identification request after the bounded wait
    pub fn check_assignment_timeout(&mut self, now: SystemTime) -> Result<bool> {
        self.assignment.check_timeout(now)
    }

    /// Updates the battery level reported with subsequent sends
    pub fn set_battery(&mut self, level: u8) {
        self.battery = Some(level);
    }

    /// Records a state change; schedules a data report for sensors
    pub fn set_state(&mut self, value: u8) {
        let value = value % 2;
        if value == self.value {
            return;
        }
        self.value = value;
        if let Some(data) = &mut self.data {
            data.trigger();
            debug!(value, "state changed, data report scheduled");
        }
    }

    /// Sends the earliest-due message, if any class is due at `now`
    ///
    /// Returns how many messages were sent: 0 or 1. The link is a single
    /// shared half-duplex channel, so at most one request per device is in
    /// flight at a time; when several classes are due the earliest-due one
    /// goes out and the next tick picks up the rest. Before an address is
    /// assigned the device is mute apart from the identification handshake,
    /// which [`press_button`](Device::press_button) drives separately.
    pub async fn tick(&mut self, now: Instant) -> Result<usize> {
        if !self.is_assigned() {
            return Ok(0);
        }

        let address = self.address();

        let mut earliest: Option<(MessageClass, Instant)> = None;
        for class in [MessageClass::Watchdog, MessageClass::Data, MessageClass::Request] {
            let Some(schedule) = self.schedule_mut(class) else {
                continue;
            };
            if let Some(at) = schedule.next_send(now) {
                if at <= now && earliest.map_or(true, |(_, best)| at < best) {
                    earliest = Some((class, at));
                }
            }
        }
        let Some((class, _)) = earliest else {
            return Ok(0);
        };

        let message = match class {
            MessageClass::Watchdog => {
                Message::watchdog(Self::report(address, self.value, self.battery))
            }
            MessageClass::Data => {
                Message::data(Self::report(address, self.value, self.battery))
            }
            MessageClass::Request => match self.battery {
                Some(level) => Message::request_with_battery(address, self.value, level),
                None => Message::request(address, self.value),
            },
            MessageClass::Identification => return Ok(0),
        };

        self.message_tx
            .send(message)
            .await
            .map_err(|e| crate::core::Error::protocol(format!("Failed to send: {}", e)))?;

        if let Some(schedule) = self.schedule_mut(class) {
            schedule.record_send(now);
        }
        Ok(1)
    }

    /// Handles one inbound message
    ///
    /// Before assignment only the identification response matters; after it,
    /// responses acknowledge their class's schedule, and only when the
    /// address matches ours. Everything else on the shared link is ignored.
    pub async fn handle_message(&mut self, message: Message) -> Result<()> {
        if !self.is_assigned() {
            if matches!(message, Message::IdentificationResponse { .. }) {
                return self.assignment.handle_message(message).await;
            }
            trace!(code = message.type_code(), "unassigned device ignoring message");
            return Ok(());
        }

        let ours = self.address();
        match message {
            Message::RequestResponse { address, value } if address == ours => {
                if let Some(poll) = &mut self.poll {
                    poll.record_ack();
                }
                // The response commands the actuator's state
                self.value = value.wrapping_sub(b'0') % 2;
                Ok(())
            }
            Message::WatchdogResponse { address, .. } if address == ours => {
                if let Some(watchdog) = &mut self.watchdog {
                    watchdog.record_ack();
                }
                Ok(())
            }
            Message::DataResponse { address, .. } if address == ours => {
                if let Some(data) = &mut self.data {
                    data.record_ack();
                }
                Ok(())
            }
            other => {
                // Another device's traffic, or a class we never sent
                trace!(code = other.type_code(), "ignoring unrelated message");
                Ok(())
            }
        }
    }

    fn schedule_mut(&mut self, class: MessageClass) -> Option<&mut SendSchedule> {
        match class {
            MessageClass::Watchdog => self.watchdog.as_mut(),
            MessageClass::Data => self.data.as_mut(),
            MessageClass::Request => self.poll.as_mut(),
            MessageClass::Identification => None,
        }
    }

    fn report(address: Address, value: u8, battery: Option<u8>) -> SwitchPayload {
        let payload = SwitchPayload::from_state(address, value);
        match battery {
            Some(level) => payload.with_battery(level),
            None => payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> Config {
        Config::default()
    }

    fn assigned_sensor(tx: mpsc::Sender<Message>) -> Device {
        Device::sensor_with_address(
            ModuleType(*b"TMP"),
            tx,
            &test_config(),
            Address::new([0, 1, 0, 1]),
        )
    }

    #[tokio::test]
    async fn test_unassigned_device_is_mute() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut device = Device::sensor(ModuleType(*b"TMP"), tx, &test_config());

        assert_eq!(device.tick(Instant::now()).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_assigned_address_used_in_messages() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut device = Device::sensor(ModuleType(*b"LED"), tx, &test_config());

        device.press_button().await.unwrap();
        let request = rx.recv().await.unwrap();
        assert!(matches!(request, Message::IdentificationReq { .. }));

        let assigned = Address::new([0x00, 0x01, 0x00, 0x01]);
        device
            .handle_message(Message::identification_response(assigned))
            .await
            .unwrap();
        assert_eq!(device.address(), assigned);

        // First tick sends the heartbeat with the assigned address
        let sent = device.tick(Instant::now()).await.unwrap();
        assert_eq!(sent, 1);
        match rx.recv().await.unwrap() {
            Message::WatchdogReq { report } => assert_eq!(report.address, assigned),
            other => panic!("Expected watchdog, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_watchdog_retry_until_matching_ack() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut device = assigned_sensor(tx);
        let t0 = Instant::now();

        assert_eq!(device.tick(t0).await.unwrap(), 1);
        rx.recv().await.unwrap();

        // Unacknowledged: retries land on the 2 s grid, indefinitely
        for i in 1..=5u64 {
            let t = t0 + Duration::from_secs(2 * i);
            assert_eq!(device.tick(t).await.unwrap(), 1, "retry {} due", i);
            rx.recv().await.unwrap();
        }

        // A response for some other device does not acknowledge
        device
            .handle_message(Message::watchdog_response(Address::new([9, 9, 9, 9]), 0))
            .await
            .unwrap();
        let t = t0 + Duration::from_secs(12);
        assert_eq!(device.tick(t).await.unwrap(), 1);
        rx.recv().await.unwrap();

        // The matching response stops the retries
        device
            .handle_message(Message::watchdog_response(device.address(), 0))
            .await
            .unwrap();
        assert_eq!(device.tick(t + Duration::from_secs(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_data_report_gives_up_after_window() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut device = assigned_sensor(tx);
        let t0 = Instant::now();

        // Quiet the watchdog so only data traffic remains
        assert_eq!(device.tick(t0).await.unwrap(), 1);
        rx.recv().await.unwrap();
        device
            .handle_message(Message::watchdog_response(device.address(), 0))
            .await
            .unwrap();

        device.set_state(1);
        assert_eq!(device.tick(t0).await.unwrap(), 1);
        match rx.recv().await.unwrap() {
            Message::DataReq { report } => assert_eq!(report.value, b'1'),
            other => panic!("Expected data report, got {:?}", other),
        }

        // One retry inside the 2 s window
        assert_eq!(device.tick(t0 + Duration::from_secs(2)).await.unwrap(), 1);
        rx.recv().await.unwrap();

        // Window exhausted: no further retries until the next state change
        assert_eq!(device.tick(t0 + Duration::from_secs(4)).await.unwrap(), 0);
        assert_eq!(device.tick(t0 + Duration::from_secs(30)).await.unwrap(), 0);

        device.set_state(0);
        assert_eq!(device.tick(t0 + Duration::from_secs(31)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_actuator_poll_cadence() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut device = Device::actuator(ModuleType(*b"SWI"), tx, &test_config());
        assert_eq!(device.device_type(), DeviceType::ACTUATOR);
        let assigned = Address::new([0, 2, 0, 2]);

        device.press_button().await.unwrap();
        rx.recv().await.unwrap();
        device
            .handle_message(Message::identification_response(assigned))
            .await
            .unwrap();

        let t0 = Instant::now();
        assert_eq!(device.tick(t0).await.unwrap(), 1);
        assert!(matches!(rx.recv().await.unwrap(), Message::RequestReq { .. }));

        // Not due again until the next 500 ms slot
        assert_eq!(device.tick(t0 + Duration::from_millis(200)).await.unwrap(), 0);
        assert_eq!(device.tick(t0 + Duration::from_millis(500)).await.unwrap(), 1);

        // The response commands the actuator state
        device
            .handle_message(Message::request_response(assigned, 1))
            .await
            .unwrap();
        assert_eq!(device.value(), 1);
    }

    #[tokio::test]
    async fn test_one_request_in_flight_per_tick() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut device = assigned_sensor(tx);
        let t0 = Instant::now();

        assert_eq!(device.tick(t0).await.unwrap(), 1);
        assert!(matches!(rx.recv().await.unwrap(), Message::WatchdogReq { .. }));

        // Heartbeat unacknowledged and a state change pending: the shared
        // half-duplex link still carries only one request per tick
        device.set_state(1);
        let t2 = t0 + Duration::from_secs(2);
        assert_eq!(device.tick(t2).await.unwrap(), 1);
        let first = rx.recv().await.unwrap();
        assert!(
            rx.try_recv().is_err(),
            "at most one request may be in flight"
        );

        // The other due class follows on the next tick
        assert_eq!(device.tick(t2).await.unwrap(), 1);
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            (&first, &second),
            (Message::WatchdogReq { .. }, Message::DataReq { .. })
                | (Message::DataReq { .. }, Message::WatchdogReq { .. })
        ));
    }

    #[tokio::test]
    async fn test_state_change_requires_actual_change() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut device = assigned_sensor(tx);
        let t0 = Instant::now();

        // Drain and ack the initial heartbeat
        device.tick(t0).await.unwrap();
        rx.recv().await.unwrap();
        device
            .handle_message(Message::watchdog_response(device.address(), 0))
            .await
            .unwrap();

        // Same value: no report
        device.set_state(0);
        assert_eq!(device.tick(t0 + Duration::from_secs(1)).await.unwrap(), 0);
    }
}
