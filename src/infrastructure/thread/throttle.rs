//! Rate limiting of progress notifications.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default window of [`NotificationPolicy::TimeLimited`].
pub const DEFAULT_NOTIFICATION_WINDOW: Duration = Duration::from_millis(100);

/// How often a worker thread may forward progress to its consumer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPolicy {
    /// One notification in flight until the consumer acknowledges it.
    Direct,
    /// At most one notification per window.
    #[default]
    TimeLimited,
}

/// Decides whether a progress event may be sent now.
///
/// Final completion events never ask.
#[derive(Debug)]
pub struct NotificationThrottler {
    policy: NotificationPolicy,
    window: Duration,
    in_flight: bool,
    last_sent: Option<Instant>,
}

impl NotificationThrottler {
    #[must_use]
    pub const fn new(policy: NotificationPolicy, window: Duration) -> Self {
        Self {
            policy,
            window,
            in_flight: false,
            last_sent: None,
        }
    }

    /// Returns true and records a send if a notification may go out now.
    pub fn query_send(&mut self) -> bool {
        self.query_send_at(Instant::now())
    }

    fn query_send_at(&mut self, now: Instant) -> bool {
        match self.policy {
            NotificationPolicy::Direct => {
                if self.in_flight {
                    return false;
                }
                self.in_flight = true;
                true
            }
            NotificationPolicy::TimeLimited => {
                if self
                    .last_sent
                    .is_some_and(|last| now.duration_since(last) < self.window)
                {
                    return false;
                }
                self.last_sent = Some(now);
                true
            }
        }
    }

    /// The consumer has processed the last notification.
    pub fn notification_received(&mut self) {
        self.in_flight = false;
    }

    /// A final event went out; it acknowledges any progress still in flight.
    pub fn completed(&mut self) {
        self.in_flight = false;
    }

    pub fn set_policy(&mut self, policy: NotificationPolicy) {
        self.policy = policy;
        self.in_flight = false;
        self.last_sent = None;
    }

    #[must_use]
    pub const fn policy(&self) -> NotificationPolicy {
        self.policy
    }
}

impl Default for NotificationThrottler {
    fn default() -> Self {
        Self::new(NotificationPolicy::default(), DEFAULT_NOTIFICATION_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_burst_within_window_is_suppressed() {
        let mut throttler = NotificationThrottler::default();
        let start = Instant::now();
        let sent = (0..10)
            .filter(|i| throttler.query_send_at(start + Duration::from_millis(i * 5)))
            .count();
        assert!(sent <= 2, "sent {sent} progress events");
        assert!(sent >= 1);
    }

    #[test]
    fn test_window_reopens() {
        let mut throttler = NotificationThrottler::default();
        let start = Instant::now();
        assert!(throttler.query_send_at(start));
        assert!(!throttler.query_send_at(start + Duration::from_millis(99)));
        assert!(throttler.query_send_at(start + Duration::from_millis(100)));
    }

    #[test]
    fn test_direct_waits_for_acknowledgement() {
        let mut throttler = NotificationThrottler::new(NotificationPolicy::Direct, Duration::ZERO);
        assert!(throttler.query_send());
        assert!(!throttler.query_send());
        throttler.notification_received();
        assert!(throttler.query_send());
    }

    #[test]
    fn test_completion_releases_direct_policy() {
        let mut throttler = NotificationThrottler::new(NotificationPolicy::Direct, Duration::ZERO);
        assert!(throttler.query_send());
        throttler.completed();
        assert!(throttler.query_send());
    }

    #[test_case(NotificationPolicy::Direct ; "direct")]
    #[test_case(NotificationPolicy::TimeLimited ; "time limited")]
    fn test_first_event_always_passes(policy: NotificationPolicy) {
        let mut throttler = NotificationThrottler::new(policy, DEFAULT_NOTIFICATION_WINDOW);
        assert!(throttler.query_send());
    }
}
