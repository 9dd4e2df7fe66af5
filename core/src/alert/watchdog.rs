// Silence watchdog — detects a relay gateway that has gone quiet
//
// Latched: once the silent notification fires it does not fire again until a
// batch arrives, which re-arms the timer and reports the reconnection. Pure
// state machine over injected instants so tests never sleep.

use super::notify::Notification;
use std::time::{Duration, Instant};

pub const RELAY_SILENT_SUBJECT: &str = "Relay status: silent";
pub const RELAY_RECONNECTED_SUBJECT: &str = "Relay status: reconnected";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogEvent {
    RelaySilent,
    RelayReconnected,
}

#[derive(Debug)]
pub struct SilenceWatchdog {
    window: Duration,
    last_received: Instant,
    silent: bool,
}

impl SilenceWatchdog {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_received: now,
            silent: false,
        }
    }

    /// Note a batch arrival. Returns the reconnection event when the watchdog
    /// had latched silent.
    pub fn batch_received(&mut self, now: Instant) -> Option<WatchdogEvent> {
        self.last_received = now;
        if self.silent {
            self.silent = false;
            return Some(WatchdogEvent::RelayReconnected);
        }
        None
    }

    /// Check the timer. Returns the silent event exactly once per silence.
    pub fn poll(&mut self, now: Instant) -> Option<WatchdogEvent> {
        if !self.silent && now.duration_since(self.last_received) >= self.window {
            self.silent = true;
            return Some(WatchdogEvent::RelaySilent);
        }
        None
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }
}

/// Render the notification for a watchdog event.
pub fn watchdog_notification(event: WatchdogEvent, window: Duration) -> Notification {
    match event {
        WatchdogEvent::RelaySilent => Notification::new(
            RELAY_SILENT_SUBJECT,
            format!(
                "No data has been received from the relay gateway for {} minutes.",
                window.as_secs() / 60
            ),
        ),
        WatchdogEvent::RelayReconnected => Notification::new(
            RELAY_RECONNECTED_SUBJECT,
            "The relay gateway is delivering data again.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(600);

    #[test]
    fn test_silent_fires_exactly_once() {
        let start = Instant::now();
        let mut watchdog = SilenceWatchdog::new(WINDOW, start);

        assert_eq!(watchdog.poll(start + Duration::from_secs(599)), None);
        assert_eq!(
            watchdog.poll(start + WINDOW),
            Some(WatchdogEvent::RelaySilent)
        );
        // Latched: later polls stay quiet.
        assert_eq!(watchdog.poll(start + WINDOW * 3), None);
        assert!(watchdog.is_silent());
    }

    #[test]
    fn test_reconnect_fires_once_and_rearms() {
        let start = Instant::now();
        let mut watchdog = SilenceWatchdog::new(WINDOW, start);

        watchdog.poll(start + WINDOW);
        let arrival = start + WINDOW + Duration::from_secs(30);
        assert_eq!(
            watchdog.batch_received(arrival),
            Some(WatchdogEvent::RelayReconnected)
        );
        assert_eq!(watchdog.batch_received(arrival + Duration::from_secs(1)), None);

        // Re-armed from the last arrival.
        assert_eq!(watchdog.poll(arrival + Duration::from_secs(500)), None);
        assert_eq!(
            watchdog.poll(arrival + Duration::from_secs(1) + WINDOW),
            Some(WatchdogEvent::RelaySilent)
        );
    }

    #[test]
    fn test_arrivals_keep_the_watchdog_quiet() {
        let start = Instant::now();
        let mut watchdog = SilenceWatchdog::new(WINDOW, start);

        let mut now = start;
        for _ in 0..10 {
            now += Duration::from_secs(300);
            assert_eq!(watchdog.batch_received(now), None);
            assert_eq!(watchdog.poll(now), None);
        }
    }

    #[test]
    fn test_notification_texts() {
        let silent = watchdog_notification(WatchdogEvent::RelaySilent, WINDOW);
        assert_eq!(silent.subject, RELAY_SILENT_SUBJECT);
        assert!(silent.body.contains("10 minutes"));

        let back = watchdog_notification(WatchdogEvent::RelayReconnected, WINDOW);
        assert_eq!(back.subject, RELAY_RECONNECTED_SUBJECT);
    }
}
