//! Per-class timing and retry policy
//!
//! The protocol fixes a cadence and retry contract for each message class;
//! the scheduling layer enforces it through [`SendSchedule`]. Retries run at
//! fixed intervals, never exponential backoff, and a newer scheduled send of
//! the same class supersedes an unanswered prior one.

use std::time::{Duration, Instant};

use crate::core::Config;

/// The four policy classes, one per message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageClass {
    /// One-shot handshake, manual trigger only
    Identification,
    /// Actuator poll
    Request,
    /// Sensor heartbeat
    Watchdog,
    /// Sensor state-change report
    Data,
}

/// Timing contract for one message class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPolicy {
    /// Regular send cadence; `None` means event-driven (manual trigger or
    /// state change)
    pub cadence: Option<Duration>,
    /// How long the initiator waits for the paired response
    pub response_wait: Option<Duration>,
    /// Interval between retries while unacknowledged; `None` means no retry
    pub retry_interval: Option<Duration>,
    /// Total time retries may run from the first attempt; `None` means
    /// retry indefinitely
    pub retry_window: Option<Duration>,
}

impl MessageClass {
    /// Returns the default policy table entry for this class
    pub const fn policy(self) -> ClassPolicy {
        match self {
            // Once per button press; if no response, go idle until the next
            // press
            MessageClass::Identification => ClassPolicy {
                cadence: None,
                response_wait: Some(Duration::from_secs(2)),
                retry_interval: None,
                retry_window: None,
            },
            // Poll every 500 ms, wait 100 ms; the next poll supersedes an
            // unanswered one
            MessageClass::Request => ClassPolicy {
                cadence: Some(Duration::from_millis(500)),
                response_wait: Some(Duration::from_millis(100)),
                retry_interval: None,
                retry_window: None,
            },
            // Heartbeat every minute; unacknowledged, retry every 2 s until
            // answered
            MessageClass::Watchdog => ClassPolicy {
                cadence: Some(Duration::from_secs(60)),
                response_wait: None,
                retry_interval: Some(Duration::from_secs(2)),
                retry_window: None,
            },
            // On state change; retry every 2 s for up to 2 s total, then
            // wait for the next change
            MessageClass::Data => ClassPolicy {
                cadence: None,
                response_wait: None,
                retry_interval: Some(Duration::from_secs(2)),
                retry_window: Some(Duration::from_secs(2)),
            },
        }
    }

    /// Builds the policy entry from a runtime configuration
    pub fn policy_from(self, config: &Config) -> ClassPolicy {
        match self {
            MessageClass::Identification => ClassPolicy {
                response_wait: Some(config.identification_wait),
                ..self.policy()
            },
            MessageClass::Request => ClassPolicy {
                cadence: Some(config.poll_interval),
                response_wait: Some(config.response_wait),
                ..self.policy()
            },
            MessageClass::Watchdog => ClassPolicy {
                cadence: Some(config.watchdog_interval),
                retry_interval: Some(config.retry_interval),
                ..self.policy()
            },
            MessageClass::Data => ClassPolicy {
                retry_interval: Some(config.retry_interval),
                retry_window: Some(config.data_retry_window),
                ..self.policy()
            },
        }
    }
}

/// Send scheduler for one message class on one device
///
/// Tracks the last send, the first attempt of the current burst, and whether
/// an acknowledgement arrived, and answers when the next send is due. The
/// schedule holds no message content; composing the message stays with the
/// caller.
#[derive(Debug, Clone)]
pub struct SendSchedule {
    class: MessageClass,
    policy: ClassPolicy,
    /// Whether the class is currently allowed to send at all; event-driven
    /// classes arm on trigger, cadence classes are always armed
    armed: bool,
    last_sent: Option<Instant>,
    first_sent: Option<Instant>,
    acked: bool,
}

impl SendSchedule {
    /// Creates a schedule with the default policy for the class
    pub fn new(class: MessageClass) -> Self {
        Self::with_policy(class, class.policy())
    }

    /// Creates a schedule with an explicit policy entry
    pub fn with_policy(class: MessageClass, policy: ClassPolicy) -> Self {
        SendSchedule {
            class,
            policy,
            armed: policy.cadence.is_some(),
            last_sent: None,
            first_sent: None,
            acked: false,
        }
    }

    /// Returns the class this schedule drives
    pub fn class(&self) -> MessageClass {
        self.class
    }

    /// Returns the policy entry in force
    pub fn policy(&self) -> ClassPolicy {
        self.policy
    }

    /// Arms an event-driven class: button press or state change
    ///
    /// Starts a fresh burst; any previous unanswered attempt is abandoned.
    pub fn trigger(&mut self) {
        self.armed = true;
        self.acked = false;
        self.last_sent = None;
        self.first_sent = None;
    }

    /// Records that a message of this class was sent
    pub fn record_send(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.first_sent.get_or_insert(now);
        self.acked = false;
    }

    /// Records the matching acknowledgement
    ///
    /// Event-driven classes go idle until the next trigger; cadence classes
    /// resume their regular interval.
    pub fn record_ack(&mut self) {
        self.acked = true;
        if self.policy.cadence.is_none() {
            self.armed = false;
        }
        self.first_sent = None;
    }

    /// Returns when the next send is due, or `None` when the class is idle
    pub fn next_send(&self, now: Instant) -> Option<Instant> {
        if !self.armed {
            return None;
        }

        let last = match self.last_sent {
            Some(last) => last,
            // Armed but never sent: due immediately
            None => return Some(now),
        };

        if self.acked {
            return self.policy.cadence.map(|cadence| last + cadence);
        }

        if let Some(retry) = self.policy.retry_interval {
            let candidate = last + retry;
            if let (Some(window), Some(first)) = (self.policy.retry_window, self.first_sent) {
                if candidate.duration_since(first) > window {
                    // Burst exhausted; idle until the next trigger
                    return None;
                }
            }
            return Some(candidate);
        }

        // No retry for this class: the next cadence tick supersedes the
        // unanswered send
        self.policy.cadence.map(|cadence| last + cadence)
    }

    /// Returns the deadline for the paired response of a send at `sent`
    pub fn response_deadline(&self, sent: Instant) -> Option<Instant> {
        self.policy.response_wait.map(|wait| sent + wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_table() {
        let identification = MessageClass::Identification.policy();
        assert_eq!(identification.cadence, None);
        assert_eq!(identification.retry_interval, None);

        let request = MessageClass::Request.policy();
        assert_eq!(request.cadence, Some(Duration::from_millis(500)));
        assert_eq!(request.response_wait, Some(Duration::from_millis(100)));

        let watchdog = MessageClass::Watchdog.policy();
        assert_eq!(watchdog.cadence, Some(Duration::from_secs(60)));
        assert_eq!(watchdog.retry_interval, Some(Duration::from_secs(2)));
        assert_eq!(watchdog.retry_window, None);

        let data = MessageClass::Data.policy();
        assert_eq!(data.cadence, None);
        assert_eq!(data.retry_interval, Some(Duration::from_secs(2)));
        assert_eq!(data.retry_window, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = Config::default();
        config.poll_interval = Duration::from_millis(250);
        config.watchdog_interval = Duration::from_secs(30);

        let request = MessageClass::Request.policy_from(&config);
        assert_eq!(request.cadence, Some(Duration::from_millis(250)));

        let watchdog = MessageClass::Watchdog.policy_from(&config);
        assert_eq!(watchdog.cadence, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_request_poll_supersession() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(MessageClass::Request);

        // Cadence classes are due immediately
        assert_eq!(schedule.next_send(t0), Some(t0));
        schedule.record_send(t0);

        // No answer: the next 500 ms poll supersedes, no early retry
        assert_eq!(
            schedule.next_send(t0 + Duration::from_millis(200)),
            Some(t0 + Duration::from_millis(500))
        );

        // Answered: same next poll
        schedule.record_ack();
        assert_eq!(
            schedule.next_send(t0 + Duration::from_millis(200)),
            Some(t0 + Duration::from_millis(500))
        );
    }

    #[test]
    fn test_watchdog_retries_until_acked() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(MessageClass::Watchdog);

        schedule.record_send(t0);

        // Unanswered: retry every 2 s, indefinitely
        let mut last = t0;
        for _ in 0..10 {
            let next = schedule.next_send(last).expect("watchdog never goes idle");
            assert_eq!(next, last + Duration::from_secs(2));
            schedule.record_send(next);
            last = next;
        }

        // Acknowledged: back to the 60 s heartbeat cadence
        schedule.record_ack();
        assert_eq!(
            schedule.next_send(last),
            Some(last + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_data_retry_window() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(MessageClass::Data);

        // Idle until a state change happens
        assert_eq!(schedule.next_send(t0), None);

        schedule.trigger();
        assert_eq!(schedule.next_send(t0), Some(t0));
        schedule.record_send(t0);

        // Exactly one retry fits the 2 s window
        let retry = schedule.next_send(t0).expect("first retry due");
        assert_eq!(retry, t0 + Duration::from_secs(2));
        schedule.record_send(retry);

        // A second retry would fall outside the window: give up
        assert_eq!(schedule.next_send(retry), None);

        // The next state change starts a fresh burst
        schedule.trigger();
        let t10 = t0 + Duration::from_secs(10);
        assert_eq!(schedule.next_send(t10), Some(t10));
    }

    #[test]
    fn test_data_ack_stops_retries() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(MessageClass::Data);

        schedule.trigger();
        schedule.record_send(t0);
        schedule.record_ack();

        assert_eq!(schedule.next_send(t0 + Duration::from_secs(1)), None);
    }

    #[test]
    fn test_identification_single_shot() {
        let t0 = Instant::now();
        let mut schedule = SendSchedule::new(MessageClass::Identification);

        // Mute until the button press
        assert_eq!(schedule.next_send(t0), None);

        schedule.trigger();
        assert_eq!(schedule.next_send(t0), Some(t0));
        schedule.record_send(t0);

        // No response: no retry, idle until the next press
        assert_eq!(schedule.next_send(t0 + Duration::from_secs(60)), None);
    }

    #[test]
    fn test_response_deadline() {
        let t0 = Instant::now();
        let schedule = SendSchedule::new(MessageClass::Request);
        assert_eq!(
            schedule.response_deadline(t0),
            Some(t0 + Duration::from_millis(100))
        );

        let watchdog = SendSchedule::new(MessageClass::Watchdog);
        assert_eq!(watchdog.response_deadline(t0), None);
    }
}
